//! Newline-delimited JSON fragments (recorded streams, log replays).

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::wrappers::LinesStream;

use super::FragmentStream;
use crate::error::ThoughtlineError;
use crate::types::RawFragment;

/// One fragment per non-blank line. An I/O error ends the stream.
pub fn decode_json_lines<R>(reader: R) -> FragmentStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let lines = LinesStream::new(reader.lines());
    let stream = async_stream::stream! {
        futures::pin_mut!(lines);
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        yield Ok(RawFragment::parse(line));
                    }
                }
                Err(e) => {
                    yield Err(ThoughtlineError::Io(e));
                    break;
                }
            }
        }
    };
    Box::pin(stream)
}
