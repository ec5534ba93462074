pub mod data;
pub mod io;

pub use data::{Config, ServerConfig, DEFAULT_BASE_URL};
pub use io::ConfigError;
