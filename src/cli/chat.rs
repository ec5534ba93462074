//! Interactive line-based chat loop

use std::error::Error;
use std::future::Future;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::models::ModelDirectory;
use crate::cli::model_list::model_listing_lines;
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamMetrics};
use crate::core::config::ServerConfig;
use crate::core::conversation::Conversation;

pub struct ChatOptions {
    pub client: reqwest::Client,
    pub server: ServerConfig,
    pub model: Option<String>,
    pub show_metrics: bool,
}

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Model(Option<String>),
    Models,
    Clear,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ChatInput::Message(trimmed.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "quit" | "exit" => ChatInput::Quit,
        "clear" => ChatInput::Clear,
        "models" => ChatInput::Models,
        "help" => ChatInput::Help,
        "model" if arg.is_empty() => ChatInput::Model(None),
        "model" => ChatInput::Model(Some(arg.to_string())),
        _ => ChatInput::Unknown(name.to_string()),
    }
}

/// Summary printed after a reply, e.g. `📊 42 tokens in 1.05s (40.0 tok/s)`.
pub fn format_metrics(metrics: &StreamMetrics) -> Option<String> {
    let tokens = metrics.eval_count?;
    let mut line = format!("📊 {tokens} tokens");
    if let Some(duration) = metrics.eval_duration.filter(|d| *d > 0) {
        line.push_str(&format!(" in {:.2}s", duration as f64 / 1e9));
    }
    if let Some(rate) = metrics.tokens_per_second() {
        line.push_str(&format!(" ({rate:.1} tok/s)"));
    }
    Some(line)
}

struct ChatSession {
    options: ChatOptions,
    conversation: Conversation,
    service: ChatStreamService,
}

impl ChatSession {
    fn send(&mut self, text: String) {
        let was_streaming = self.conversation.is_streaming();
        match self.conversation.submit(text) {
            Ok(exchange) => {
                if was_streaming {
                    println!("\n⏹  Previous reply stopped.");
                }
                let params = exchange
                    .into_params(self.options.client.clone(), self.options.server.base_url.clone());
                self.service.spawn_stream(params);
            }
            Err(err) => {
                eprintln!("⚠️  {err}");
                prompt();
            }
        }
    }

    async fn show_models(&self) {
        let directory = ModelDirectory::new(
            self.options.client.clone(),
            self.options.server.base_url.clone(),
        );
        match directory.list_models().await {
            Ok(models) => {
                for line in model_listing_lines(models) {
                    println!("{line}");
                }
            }
            Err(err) => {
                eprintln!("⚠️  {}", err.user_notice());
                debug!(error = %err, "Model listing failed");
            }
        }
    }

    fn handle_stream_message(&mut self, message: StreamMessage, stream_id: u64) -> io::Result<()> {
        if stream_id != self.conversation.current_stream_id() {
            debug!(stream_id, "Ignoring message from superseded stream");
            return Ok(());
        }

        match message {
            StreamMessage::Event(event) => {
                if self.conversation.apply_event(stream_id, &event) {
                    print!("{}", event.delta.content);
                    io::stdout().flush()?;
                }
            }
            StreamMessage::Malformed(record) => {
                debug!(line = record.line_number, "Skipped malformed record");
            }
            StreamMessage::Completed(completion) => {
                self.conversation.finish(stream_id);
                if completion.is_cancelled() {
                    return Ok(());
                }
                println!();
                if self.options.show_metrics {
                    if let Some(line) = completion.metrics.as_ref().and_then(format_metrics) {
                        println!("{line}");
                    }
                }
                prompt();
            }
            StreamMessage::Failed(err) => {
                warn!(error = %err, stream_id, "Chat stream failed");
                let notice = err.user_notice();
                if self.conversation.fail(stream_id, notice.clone()) {
                    eprintln!("\n⚠️  {notice}");
                    prompt();
                }
            }
        }
        Ok(())
    }
}

/// Forward every Ctrl+C to a channel for the lifetime of the session.
///
/// One listener stays registered throughout, so a press that lands while the
/// loop is busy waits in the channel instead of being dropped.
fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Failed to listen for Ctrl+C");
                break;
            }
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run `future` unless an interrupt arrives first.
async fn unless_interrupted<F: Future>(
    future: F,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        Some(()) = interrupts.recv() => None,
        output = future => Some(output),
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn print_help() {
    println!("Commands:");
    println!("  /model <name>   Switch models for the next message");
    println!("  /model          Show the current model");
    println!("  /models         List installed models");
    println!("  /clear          Start a fresh conversation");
    println!("  /quit           Leave the chat");
    println!("Ctrl+C stops the current reply, or quits when idle.");
}

pub async fn run_chat(options: ChatOptions) -> Result<(), Box<dyn Error>> {
    let (service, mut rx) = ChatStreamService::new();
    let mut session = ChatSession {
        conversation: Conversation::new(options.model.clone()),
        options,
        service,
    };

    match session.conversation.model() {
        Some(model) => println!("💬 Chatting with {model}. Type /help for commands."),
        None => println!("💬 No model selected. Use /model <name> to pick one."),
    }
    info!(
        base_url = %session.options.server.base_url,
        model = session.conversation.model().unwrap_or("(none)"),
        "Chat session started"
    );
    prompt();

    let mut interrupts = spawn_interrupt_listener();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    ChatInput::Empty => prompt(),
                    ChatInput::Message(text) => session.send(text),
                    ChatInput::Quit => break,
                    ChatInput::Clear => {
                        session.conversation.clear();
                        println!("🧹 Conversation cleared.");
                        prompt();
                    }
                    ChatInput::Model(None) => {
                        match session.conversation.model() {
                            Some(model) => println!("Current model: {model}"),
                            None => println!("No model selected."),
                        }
                        prompt();
                    }
                    ChatInput::Model(Some(model)) => {
                        println!("✅ Switched to {model}");
                        session.conversation.set_model(model);
                        prompt();
                    }
                    ChatInput::Models => {
                        if unless_interrupted(session.show_models(), &mut interrupts)
                            .await
                            .is_none()
                        {
                            println!("\n⏹  Stopped.");
                        }
                        prompt();
                    }
                    ChatInput::Help => {
                        print_help();
                        prompt();
                    }
                    ChatInput::Unknown(name) => {
                        eprintln!("⚠️  Unknown command: /{name}. Type /help for commands.");
                        prompt();
                    }
                }
            }
            Some((message, stream_id)) = rx.recv() => {
                session.handle_stream_message(message, stream_id)?;
            }
            Some(()) = interrupts.recv() => {
                if session.conversation.cancel_current_stream() {
                    println!("\n⏹  Stopped.");
                    prompt();
                } else {
                    break;
                }
            }
        }
    }

    session.conversation.cancel_current_stream();
    println!();
    Ok(())
}
