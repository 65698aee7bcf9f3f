//! Fragment sources: the boundary between the transport and the pipeline.
//!
//! The pipeline only ever asks a source for the next fragment and tells it
//! when it is done. Connecting, authenticating and retrying are the
//! transport's business.

mod json_lines;
mod sse;

pub use json_lines::decode_json_lines;
pub use sse::{decode_sse, DONE_MARKER};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::trace;

use crate::error::Result;
use crate::types::RawFragment;

/// Stream of raw fragments. Ends after the first error.
pub type FragmentStream = BoxStream<'static, Result<RawFragment>>;

/// Pull-based source of provider fragments.
#[async_trait]
pub trait FragmentSource: Send {
    /// Next fragment, an upstream failure, or `None` once exhausted.
    async fn next_fragment(&mut self) -> Option<Result<RawFragment>>;

    /// Release upstream resources. Called exactly once by the pipeline, on
    /// every exit path. Must tolerate being called after exhaustion.
    async fn close(&mut self) {}
}

#[async_trait]
impl<S> FragmentSource for &mut S
where
    S: FragmentSource + ?Sized,
{
    async fn next_fragment(&mut self) -> Option<Result<RawFragment>> {
        (**self).next_fragment().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// [`FragmentSource`] over any fragment stream. Closing drops the stream,
/// which releases whatever the stream holds (connections, files).
pub struct StreamSource {
    inner: Option<FragmentStream>,
}

impl StreamSource {
    pub fn new(stream: FragmentStream) -> Self {
        Self {
            inner: Some(stream),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl From<FragmentStream> for StreamSource {
    fn from(stream: FragmentStream) -> Self {
        Self::new(stream)
    }
}

#[async_trait]
impl FragmentSource for StreamSource {
    async fn next_fragment(&mut self) -> Option<Result<RawFragment>> {
        self.inner.as_mut()?.next().await
    }

    async fn close(&mut self) {
        if self.inner.take().is_some() {
            trace!("fragment stream dropped");
        }
    }
}

/// A finished, in-memory fragment stream.
pub fn from_fragments<I>(fragments: I) -> FragmentStream
where
    I: IntoIterator<Item = RawFragment>,
    I::IntoIter: Send + 'static,
{
    Box::pin(futures::stream::iter(fragments.into_iter().map(Ok)))
}
