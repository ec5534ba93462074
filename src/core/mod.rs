pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod error;
pub mod ndjson;
