//! Conversation state driven by chat stream events.
//!
//! A conversation owns its turns and the bookkeeping for the one reply that
//! may be streaming at a time. Submitting a new message while a reply is
//! still streaming cancels the old stream first; events that arrive late from
//! a superseded stream are recognized by their stream id and dropped.

use chrono::{DateTime, Utc};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatMessage, Role};
use crate::core::chat_stream::{StreamEvent, StreamParams};

pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Streaming,
    Complete,
    /// The reply failed; the turn carries a notice.
    Failed,
    /// The user stopped the reply; partial content is kept.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: TurnStatus,
    pub notice: Option<String>,
}

impl ConversationTurn {
    pub fn is_streaming(&self) -> bool {
        self.status == TurnStatus::Streaming
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    NoModelSelected,
    EmptyMessage,
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationError::NoModelSelected => {
                write!(f, "No model selected. Pick one with /model <name>.")
            }
            ConversationError::EmptyMessage => write!(f, "Message is empty."),
        }
    }
}

impl std::error::Error for ConversationError {}

/// Everything needed to start the stream for a freshly submitted message.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    pub model: String,
    pub history: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
    pub reply_turn: TurnId,
}

impl PendingExchange {
    pub fn into_params(self, client: reqwest::Client, base_url: impl Into<String>) -> StreamParams {
        StreamParams {
            client,
            base_url: base_url.into(),
            model: self.model,
            messages: self.history,
            cancel_token: self.cancel_token,
            stream_id: self.stream_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
    model: Option<String>,
    next_turn_id: TurnId,
    stream_cancel_token: Option<CancellationToken>,
    current_stream_id: u64,
    streaming_turn: Option<TurnId>,
}

impl Conversation {
    pub fn new(model: Option<String>) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn turn(&self, id: TurnId) -> Option<&ConversationTurn> {
        self.turns.iter().find(|turn| turn.id == id)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_turn.is_some()
    }

    pub fn current_stream_id(&self) -> u64 {
        self.current_stream_id
    }

    /// History sent with the next request.
    ///
    /// Failed replies are left out since their text is a notice rather than
    /// model output, as are replies that produced nothing.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter(|turn| match turn.role {
                Role::User | Role::System => true,
                Role::Assistant => {
                    turn.status != TurnStatus::Failed && !turn.content.is_empty()
                }
            })
            .map(|turn| ChatMessage::new(turn.role, turn.content.clone()))
            .collect()
    }

    /// Record a user message and open a streaming reply turn for it.
    pub fn submit(&mut self, content: impl Into<String>) -> Result<PendingExchange, ConversationError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        let model = self
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .ok_or(ConversationError::NoModelSelected)?;

        self.cancel_current_stream();

        self.push_turn(Role::User, content, TurnStatus::Complete);
        let history = self.history();
        let reply_turn = self.push_turn(Role::Assistant, String::new(), TurnStatus::Streaming);

        let (cancel_token, stream_id) = self.start_new_stream();
        self.streaming_turn = Some(reply_turn);

        debug!(stream_id, reply_turn, model = %model, history = history.len(), "Submitted message");

        Ok(PendingExchange {
            model,
            history,
            cancel_token,
            stream_id,
            reply_turn,
        })
    }

    /// Append an event's fragment to the streaming turn.
    ///
    /// Returns `false` when the event belongs to a superseded or finished
    /// stream and was ignored.
    pub fn apply_event(&mut self, stream_id: u64, event: &StreamEvent) -> bool {
        let Some(turn_id) = self.active_turn(stream_id) else {
            return false;
        };
        let Some(turn) = self.turn_mut(turn_id) else {
            return false;
        };

        turn.content.push_str(&event.delta.content);
        if event.is_final {
            turn.status = TurnStatus::Complete;
            self.end_streaming();
        }
        true
    }

    /// The stream ended without error; close the turn if it is still open.
    pub fn finish(&mut self, stream_id: u64) -> bool {
        self.close_turn(stream_id, TurnStatus::Complete, None)
    }

    /// The stream failed; keep partial content and attach the notice.
    pub fn fail(&mut self, stream_id: u64, notice: impl Into<String>) -> bool {
        self.close_turn(stream_id, TurnStatus::Failed, Some(notice.into()))
    }

    /// Stop the in-flight reply, if any, keeping what has arrived so far.
    pub fn cancel_current_stream(&mut self) -> bool {
        if let Some(token) = self.stream_cancel_token.take() {
            token.cancel();
        }
        let Some(turn_id) = self.streaming_turn.take() else {
            return false;
        };
        if let Some(turn) = self.turn_mut(turn_id) {
            turn.status = TurnStatus::Stopped;
        }
        debug!(stream_id = self.current_stream_id, turn_id, "Cancelled in-flight reply");
        true
    }

    /// Drop all turns, stopping any reply in flight.
    pub fn clear(&mut self) {
        self.cancel_current_stream();
        self.turns.clear();
    }

    fn start_new_stream(&mut self) -> (CancellationToken, u64) {
        self.current_stream_id += 1;
        let token = CancellationToken::new();
        self.stream_cancel_token = Some(token.clone());
        (token, self.current_stream_id)
    }

    fn end_streaming(&mut self) {
        self.streaming_turn = None;
        self.stream_cancel_token = None;
    }

    fn active_turn(&self, stream_id: u64) -> Option<TurnId> {
        if stream_id != self.current_stream_id {
            return None;
        }
        self.streaming_turn
    }

    fn close_turn(&mut self, stream_id: u64, status: TurnStatus, notice: Option<String>) -> bool {
        let Some(turn_id) = self.active_turn(stream_id) else {
            return false;
        };
        if let Some(turn) = self.turn_mut(turn_id) {
            turn.status = status;
            turn.notice = notice;
        }
        self.end_streaming();
        true
    }

    fn push_turn(&mut self, role: Role, content: String, status: TurnStatus) -> TurnId {
        self.next_turn_id += 1;
        let id = self.next_turn_id;
        self.turns.push(ConversationTurn {
            id,
            role,
            content,
            created_at: Utc::now(),
            status,
            notice: None,
        });
        id
    }

    fn turn_mut(&mut self, id: TurnId) -> Option<&mut ConversationTurn> {
        self.turns.iter_mut().find(|turn| turn.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::MessageDelta;

    fn event(content: &str, is_final: bool) -> StreamEvent {
        StreamEvent {
            model: "llama3".to_string(),
            created_at: String::new(),
            delta: MessageDelta {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            is_final,
            metrics: None,
        }
    }

    #[test]
    fn submit_requires_model_and_content() {
        let mut conversation = Conversation::new(None);
        assert_eq!(
            conversation.submit("hi").unwrap_err(),
            ConversationError::NoModelSelected
        );

        conversation.set_model("llama3");
        assert_eq!(
            conversation.submit("   ").unwrap_err(),
            ConversationError::EmptyMessage
        );
        assert!(conversation.turns().is_empty());
    }

    #[test]
    fn submit_snapshots_history_and_opens_streaming_turn() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let exchange = conversation.submit("hi").expect("submit");

        assert_eq!(exchange.model, "llama3");
        assert_eq!(exchange.history, vec![ChatMessage::user("hi")]);
        assert_eq!(exchange.stream_id, 1);
        assert!(conversation.is_streaming());

        let reply = conversation.turn(exchange.reply_turn).expect("reply turn");
        assert_eq!(reply.role, Role::Assistant);
        assert!(reply.is_streaming());
        assert!(reply.content.is_empty());
    }

    #[test]
    fn events_append_and_final_event_completes_turn() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let exchange = conversation.submit("hi").expect("submit");

        assert!(conversation.apply_event(exchange.stream_id, &event("He", false)));
        assert!(conversation.apply_event(exchange.stream_id, &event("llo", false)));
        assert!(conversation.apply_event(exchange.stream_id, &event("", true)));

        let reply = conversation.turn(exchange.reply_turn).expect("reply turn");
        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.status, TurnStatus::Complete);
        assert!(!conversation.is_streaming());

        assert!(!conversation.apply_event(exchange.stream_id, &event("late", false)));
        assert!(!conversation.finish(exchange.stream_id));
    }

    #[test]
    fn follow_up_history_includes_previous_reply() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let first = conversation.submit("hi").expect("submit");
        conversation.apply_event(first.stream_id, &event("Hello", true));

        let second = conversation.submit("how are you?").expect("submit");
        assert_eq!(
            second.history,
            vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("Hello"),
                ChatMessage::user("how are you?"),
            ]
        );
    }

    #[test]
    fn new_submission_cancels_the_previous_stream() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let first = conversation.submit("first").expect("submit");
        conversation.apply_event(first.stream_id, &event("partial", false));

        let second = conversation.submit("second").expect("submit");

        assert!(first.cancel_token.is_cancelled());
        assert!(!second.cancel_token.is_cancelled());
        assert_ne!(first.stream_id, second.stream_id);

        let stopped = conversation.turn(first.reply_turn).expect("first reply");
        assert_eq!(stopped.status, TurnStatus::Stopped);
        assert_eq!(stopped.content, "partial");

        assert!(!conversation.apply_event(first.stream_id, &event("stale", false)));
        assert!(!conversation.fail(first.stream_id, "stale failure"));
        assert_eq!(
            conversation.turn(first.reply_turn).expect("first reply").content,
            "partial"
        );

        let streaming: Vec<_> = conversation
            .turns()
            .iter()
            .filter(|turn| turn.is_streaming())
            .collect();
        assert_eq!(streaming.len(), 1);
        assert_eq!(streaming[0].id, second.reply_turn);

        assert_eq!(
            second.history,
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("partial"),
                ChatMessage::user("second"),
            ]
        );
    }

    #[test]
    fn failure_keeps_partial_content_and_is_left_out_of_history() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let exchange = conversation.submit("hi").expect("submit");
        conversation.apply_event(exchange.stream_id, &event("Hel", false));

        assert!(conversation.fail(exchange.stream_id, "The connection dropped."));

        let reply = conversation.turn(exchange.reply_turn).expect("reply");
        assert_eq!(reply.status, TurnStatus::Failed);
        assert_eq!(reply.content, "Hel");
        assert_eq!(reply.notice.as_deref(), Some("The connection dropped."));
        assert!(!conversation.is_streaming());

        let next = conversation.submit("again").expect("submit");
        assert_eq!(
            next.history,
            vec![ChatMessage::user("hi"), ChatMessage::user("again")]
        );
    }

    #[test]
    fn finish_without_final_event_completes_turn() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let exchange = conversation.submit("hi").expect("submit");
        conversation.apply_event(exchange.stream_id, &event("Hi", false));

        assert!(conversation.finish(exchange.stream_id));
        assert_eq!(
            conversation.turn(exchange.reply_turn).expect("reply").status,
            TurnStatus::Complete
        );
    }

    #[test]
    fn clear_cancels_and_forgets_turns() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let exchange = conversation.submit("hi").expect("submit");

        conversation.clear();

        assert!(exchange.cancel_token.is_cancelled());
        assert!(conversation.turns().is_empty());
        assert!(!conversation.is_streaming());
        assert!(!conversation.cancel_current_stream());
    }

    #[test]
    fn pending_exchange_builds_stream_params() {
        let mut conversation = Conversation::new(Some("llama3".to_string()));
        let exchange = conversation.submit("hi").expect("submit");
        let token = exchange.cancel_token.clone();

        let params = exchange.into_params(reqwest::Client::new(), "http://localhost:11434/api");

        assert_eq!(params.model, "llama3");
        assert_eq!(params.stream_id, 1);
        assert_eq!(params.messages, vec![ChatMessage::user("hi")]);
        token.cancel();
        assert!(params.cancel_token.is_cancelled());
    }
}
