//! Server-sent events framing.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use tracing::trace;

use super::FragmentStream;
use crate::error::ThoughtlineError;
use crate::types::RawFragment;

/// Payload that marks the end of an OpenAI-style event stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Decode a byte stream of server-sent events into fragments.
///
/// Bytes may arrive in arbitrary chunks, including chunks that split a line,
/// a `\r\n` pair or a multi-byte character. Each event's `data` becomes one
/// fragment; events without data are skipped. Stops at `[DONE]` or when the
/// byte stream ends. A byte-stream or framing error is yielded once as
/// [`ThoughtlineError::Transport`] and ends the stream.
pub fn decode_sse<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let events = bytes.eventsource();
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(EventStreamError::Transport(e)) => {
                    yield Err(ThoughtlineError::transport(e.to_string()));
                    break;
                }
                Err(e) => {
                    yield Err(ThoughtlineError::transport(format!("malformed event stream: {e}")));
                    break;
                }
            };

            if event.data.trim() == DONE_MARKER {
                trace!("[DONE] received");
                break;
            }
            if event.data.is_empty() {
                trace!(event = %event.event, "SSE event without data");
                continue;
            }
            yield Ok(RawFragment::parse(&event.data));
        }
    };
    Box::pin(stream)
}
