//! Boxed stream of completion chunks handed back to callers

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};

use crate::error::LlmError;
use crate::types::StreamChunk;

/// Boxed chunk stream as produced by adapters
pub type BoxChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// Lazily consumed sequence of completion chunks
///
/// Dropping or [`close`](Self::close)-ing the stream releases the
/// underlying connection. An error item is always the last item: the
/// stream ends right after yielding one.
pub struct CompletionStream {
    inner: Option<BoxChunkStream>,
}

impl CompletionStream {
    /// Wrap any chunk stream
    pub fn new(stream: impl Stream<Item = Result<StreamChunk, LlmError>> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
        }
    }

    /// A stream that ends immediately
    pub fn empty() -> Self {
        Self::new(futures_util::stream::empty())
    }

    /// Stop consumption and release the underlying connection
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// Whether the stream has been closed or has run to its end
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the stream, concatenating text deltas
    ///
    /// # Errors
    ///
    /// Returns the first error item encountered
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            if let Some(content) = chunk?.delta.content {
                text.push_str(&content);
            }
        }
        Ok(text)
    }
}

impl Stream for CompletionStream {
    type Item = Result<StreamChunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(error))) => {
                self.inner = None;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_text_deltas_in_order() {
        let stream = CompletionStream::new(futures_util::stream::iter(vec![
            Ok(StreamChunk::text("a", "Hel")),
            Ok(StreamChunk::text("a", "lo")),
        ]));
        assert_eq!(stream.collect_text().await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn closed_stream_yields_nothing() {
        let mut stream = CompletionStream::new(futures_util::stream::iter(vec![Ok(StreamChunk::text("a", "x"))]));
        stream.close();
        assert!(stream.is_closed());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn error_item_surfaces_from_collect() {
        let stream = CompletionStream::new(futures_util::stream::iter(vec![
            Ok(StreamChunk::text("a", "x")),
            Err(LlmError::provider("stream interrupted: reset")),
        ]));
        assert!(stream.collect_text().await.is_err());
    }

    #[tokio::test]
    async fn stream_ends_after_error_item() {
        let mut stream = CompletionStream::new(futures_util::stream::iter(vec![
            Ok(StreamChunk::text("a", "a")),
            Err(LlmError::provider("overloaded")),
            Ok(StreamChunk::text("a", "after-error")),
        ]));

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.is_closed());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_stream_ends_immediately() {
        let mut stream = CompletionStream::empty();
        assert!(stream.next().await.is_none());
    }
}
