//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ChatMessage;
use crate::cli::chat::format_metrics;
use crate::core::chat_stream::{stream_chat, StreamParams};
use crate::core::config::ServerConfig;

pub async fn run_say(
    client: reqwest::Client,
    server: &ServerConfig,
    model: String,
    prompt: Vec<String>,
    show_metrics: bool,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: breeze say <prompt>");
        std::process::exit(1);
    }

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let params = StreamParams {
        client,
        base_url: server.base_url.clone(),
        model,
        messages: vec![ChatMessage::user(prompt)],
        cancel_token,
        stream_id: 1,
    };

    let mut stdout = io::stdout();
    let outcome = stream_chat(params, |event| {
        print!("{}", event.delta.content);
        let _ = stdout.flush();
    })
    .await;
    ctrl_c.abort();
    println!();

    match outcome {
        Ok(completion) => {
            debug!(end = ?completion.end, events = completion.events_delivered, "Say finished");
            if completion.is_cancelled() {
                eprintln!("⏹  Stopped.");
            } else if show_metrics {
                if let Some(line) = completion.metrics.as_ref().and_then(format_metrics) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ Error: {}", err.user_notice());
            debug!(error = %err, "Say failed");
            std::process::exit(1);
        }
    }
}
