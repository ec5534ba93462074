use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatMessage, ChatRequest, ChatResponse, CHAT_ENDPOINT};
use crate::core::error::StreamError;
use crate::core::ndjson::{
    Decoded, IgnoreMalformed, MalformedRecord, NdjsonDecoder, RecordObserver,
};
use crate::utils::url::construct_api_url;

/// Incremental piece of the assistant message carried by one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDelta {
    pub role: String,
    /// Suffix to append to the reply so far. Never a replacement.
    pub content: String,
}

/// Timing and token counters the server attaches to the terminal record.
///
/// Durations are in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetrics {
    pub done_reason: Option<String>,
    pub total_duration: Option<u64>,
    pub load_duration: Option<u64>,
    pub prompt_eval_count: Option<u64>,
    pub prompt_eval_duration: Option<u64>,
    pub eval_count: Option<u64>,
    pub eval_duration: Option<u64>,
}

impl StreamMetrics {
    fn from_response(response: &ChatResponse) -> Option<Self> {
        let metrics = Self {
            done_reason: response.done_reason.clone(),
            total_duration: response.total_duration,
            load_duration: response.load_duration,
            prompt_eval_count: response.prompt_eval_count,
            prompt_eval_duration: response.prompt_eval_duration,
            eval_count: response.eval_count,
            eval_duration: response.eval_duration,
        };
        (metrics != Self::default()).then_some(metrics)
    }

    /// Generation throughput, when both counters are present.
    pub fn tokens_per_second(&self) -> Option<f64> {
        match (self.eval_count, self.eval_duration) {
            (Some(count), Some(nanos)) if nanos > 0 => {
                Some(count as f64 / (nanos as f64 / 1_000_000_000.0))
            }
            _ => None,
        }
    }
}

/// One decoded line of a chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub model: String,
    /// ISO-8601 timestamp as sent by the server.
    pub created_at: String,
    pub delta: MessageDelta,
    pub is_final: bool,
    pub metrics: Option<StreamMetrics>,
}

impl StreamEvent {
    pub fn created_at_time(&self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        chrono::DateTime::parse_from_rfc3339(&self.created_at).ok()
    }
}

impl From<ChatResponse> for StreamEvent {
    fn from(response: ChatResponse) -> Self {
        let metrics = StreamMetrics::from_response(&response);
        Self {
            model: response.model,
            created_at: response.created_at,
            delta: MessageDelta {
                role: response.message.role,
                content: response.message.content,
            },
            is_final: response.done,
            metrics,
        }
    }
}

/// How a stream that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A record with `done: true` was delivered.
    FinalRecord,
    /// The body ended without a terminal record.
    EndOfBody,
    /// The caller's token fired.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamCompletion {
    pub end: StreamEnd,
    pub events_delivered: usize,
    pub malformed_records: usize,
    /// Metrics of the terminal record, if one arrived.
    pub metrics: Option<StreamMetrics>,
}

impl StreamCompletion {
    pub fn is_cancelled(&self) -> bool {
        self.end == StreamEnd::Cancelled
    }
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Stream one chat completion, handing each event to `on_event` as it is decoded.
///
/// Malformed lines are logged and skipped. See [`stream_chat_observed`] to
/// inspect them.
pub async fn stream_chat<F>(
    params: StreamParams,
    on_event: F,
) -> Result<StreamCompletion, StreamError>
where
    F: FnMut(StreamEvent),
{
    stream_chat_observed(params, on_event, &mut IgnoreMalformed).await
}

pub async fn stream_chat_observed<F, O>(
    params: StreamParams,
    on_event: F,
    observer: &mut O,
) -> Result<StreamCompletion, StreamError>
where
    F: FnMut(StreamEvent),
    O: RecordObserver + ?Sized,
{
    let StreamParams {
        client,
        base_url,
        model,
        messages,
        cancel_token,
        stream_id,
    } = params;

    if model.trim().is_empty() {
        return Err(StreamError::InvalidRequest("no model selected".to_string()));
    }

    let mut sink = EventSink {
        on_event,
        observer,
        cancel_token: &cancel_token,
        stream_id,
        events_delivered: 0,
        malformed_records: 0,
        metrics: None,
    };

    let chat_url = construct_api_url(&base_url, CHAT_ENDPOINT);
    debug!(
        stream_id,
        model = %model,
        url = %chat_url,
        history = messages.len(),
        "Opening chat stream"
    );

    let request = ChatRequest {
        model,
        messages,
        stream: true,
    };

    let response = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return Ok(sink.complete(StreamEnd::Cancelled)),
        sent = client.post(&chat_url).json(&request).send() => {
            sent.map_err(StreamError::Unreachable)?
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Ok(sink.complete(StreamEnd::Cancelled)),
            text = response.text() => text.unwrap_or_default(),
        };
        debug!(stream_id, status = status.as_u16(), "Chat request rejected");
        return Err(StreamError::RequestRejected {
            status: status.as_u16(),
            body,
        });
    }

    let mut body = response.bytes_stream();
    let mut decoder = NdjsonDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Ok(sink.complete(StreamEnd::Cancelled)),
            next = body.next() => next,
        };

        let Some(chunk) = next else {
            break;
        };

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(
                    stream_id,
                    delivered = sink.events_delivered,
                    error = %err,
                    "Chat stream interrupted"
                );
                return Err(StreamError::StreamInterrupted(err));
            }
        };

        for decoded in decoder.push::<ChatResponse>(&chunk) {
            if let Some(end) = sink.handle(decoded)? {
                return Ok(sink.complete(end));
            }
        }
    }

    if let Some(decoded) = decoder.finish::<ChatResponse>() {
        if let Some(end) = sink.handle(decoded)? {
            return Ok(sink.complete(end));
        }
    }

    Ok(sink.complete(StreamEnd::EndOfBody))
}

struct EventSink<'a, F, O: ?Sized> {
    on_event: F,
    observer: &'a mut O,
    cancel_token: &'a CancellationToken,
    stream_id: u64,
    events_delivered: usize,
    malformed_records: usize,
    metrics: Option<StreamMetrics>,
}

impl<F, O> EventSink<'_, F, O>
where
    F: FnMut(StreamEvent),
    O: RecordObserver + ?Sized,
{
    /// Deliver one decoded line. Returns the end state once the stream should stop.
    fn handle(&mut self, decoded: Decoded<ChatResponse>) -> Result<Option<StreamEnd>, StreamError> {
        // Once cancelled, later lines in the same chunk are neither reported nor delivered
        if self.cancel_token.is_cancelled() {
            return Ok(Some(StreamEnd::Cancelled));
        }

        let mut response = match decoded {
            Ok(response) => response,
            Err(record) => {
                warn!(
                    stream_id = self.stream_id,
                    line = record.line_number,
                    preview = %record.preview(),
                    error = %record,
                    "Skipping malformed chat record"
                );
                self.malformed_records += 1;
                self.observer.on_malformed(record);
                return Ok(None);
            }
        };

        if let Some(message) = response.error.take() {
            debug!(stream_id = self.stream_id, error = %message, "Server reported an error mid-stream");
            return Err(StreamError::ServerError(message));
        }

        let event = StreamEvent::from(response);
        let is_final = event.is_final;
        if is_final {
            self.metrics = event.metrics.clone();
        }

        self.events_delivered += 1;
        (self.on_event)(event);

        Ok(is_final.then_some(StreamEnd::FinalRecord))
    }

    fn complete(&self, end: StreamEnd) -> StreamCompletion {
        debug!(
            stream_id = self.stream_id,
            end = ?end,
            delivered = self.events_delivered,
            malformed = self.malformed_records,
            "Chat stream finished"
        );
        StreamCompletion {
            end,
            events_delivered: self.events_delivered,
            malformed_records: self.malformed_records,
            metrics: self.metrics.clone(),
        }
    }
}

/// Messages forwarded by [`ChatStreamService`], tagged with their stream id.
#[derive(Debug)]
pub enum StreamMessage {
    Event(StreamEvent),
    Malformed(MalformedRecord),
    Completed(StreamCompletion),
    Failed(StreamError),
}

struct ChannelObserver {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
}

impl RecordObserver for ChannelObserver {
    fn on_malformed(&mut self, record: MalformedRecord) {
        let _ = self.tx.send((StreamMessage::Malformed(record), self.stream_id));
    }
}

/// Runs chat streams on the tokio runtime and forwards their events over a channel.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Spawn one stream. Every message it produces ends with exactly one
    /// `Completed` or `Failed`.
    pub fn spawn_stream(&self, params: StreamParams) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let stream_id = params.stream_id;
            let mut observer = ChannelObserver {
                tx: tx.clone(),
                stream_id,
            };
            let event_tx = tx.clone();
            let outcome = stream_chat_observed(
                params,
                move |event| {
                    let _ = event_tx.send((StreamMessage::Event(event), stream_id));
                },
                &mut observer,
            )
            .await;

            let message = match outcome {
                Ok(completion) => StreamMessage::Completed(completion),
                Err(err) => StreamMessage::Failed(err),
            };
            let _ = tx.send((message, stream_id));
        })
    }
}
