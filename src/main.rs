fn main() {
    if let Err(err) = breeze::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
