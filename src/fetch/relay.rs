use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

use crate::observability::Metrics;
use crate::platform::{ByteStream, ContentId, PlatformError};

/// Forward-only relay of a download to the consumer.
///
/// Chunks are passed through as they arrive; nothing is buffered beyond the
/// chunk in flight. Dropping the relay drops the underlying download, which
/// is how a disconnecting consumer stops the transfer. After the first
/// error or the end of the download the stream stays terminated.
pub struct MediaStream {
    inner: Option<ByteStream>,
    worker: usize,
    content: ContentId,
    metrics: Arc<Metrics>,
    bytes: u64,
    completed: bool,
}

impl MediaStream {
    pub(crate) fn new(
        inner: ByteStream,
        worker: usize,
        content: ContentId,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Some(inner),
            worker,
            content,
            metrics,
            bytes: 0,
            completed: false,
        }
    }

    /// Bytes handed to the consumer so far
    pub fn bytes_relayed(&self) -> u64 {
        self.bytes
    }
}

impl Stream for MediaStream {
    type Item = Result<Bytes, PlatformError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!(
                    worker = this.worker,
                    content_id = %this.content,
                    bytes = this.bytes,
                    error = %e,
                    "Download failed mid-stream"
                );
                this.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.completed = true;
                this.inner = None;
                debug!(worker = this.worker, content_id = %this.content, "Download finished");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if self.completed {
            info!(
                worker = self.worker,
                content_id = %self.content,
                bytes = self.bytes,
                "Stream completed"
            );
        } else {
            info!(
                worker = self.worker,
                content_id = %self.content,
                bytes = self.bytes,
                "Stream ended early"
            );
        }
        self.metrics.stream_finished(self.completed, self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use crate::platform::{MediaHandle, MemoryPlatform, PlatformConnector};
    use futures::{StreamExt, stream};

    fn content() -> ContentId {
        "5".parse().unwrap()
    }

    #[tokio::test]
    async fn test_dropping_mid_stream_releases_download() {
        let platform = MemoryPlatform::new();
        platform.insert_track("5", None, None, vec![7u8; 100]);
        let session = platform
            .connect(0, &Credential::new("t").unwrap())
            .await
            .unwrap();
        let handle: MediaHandle = "media-5".parse().unwrap();
        let metrics = Arc::new(Metrics::new());

        let download = session.open_download(&handle, 10).await.unwrap();
        let mut relay = MediaStream::new(download, 0, content(), metrics.clone());
        assert_eq!(platform.live_downloads(), 1);

        let first = relay.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(relay.bytes_relayed(), 10);

        drop(relay);
        assert_eq!(platform.live_downloads(), 0);

        let snap = metrics.snapshot();
        assert_eq!(snap.streams_abandoned, 1);
        assert_eq!(snap.streams_completed, 0);
        assert_eq!(snap.bytes_relayed, 10);
    }

    #[tokio::test]
    async fn test_error_terminates_stream() {
        let chunks: Vec<Result<Bytes, PlatformError>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(PlatformError::Download("reset".into())),
            Ok(Bytes::from_static(b"never")),
        ];
        let metrics = Arc::new(Metrics::new());
        let mut relay = MediaStream::new(
            Box::pin(stream::iter(chunks)),
            2,
            content(),
            metrics.clone(),
        );

        assert_eq!(relay.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(relay.next().await.unwrap().is_err());
        assert!(relay.next().await.is_none());
        assert!(relay.next().await.is_none());

        drop(relay);
        assert_eq!(metrics.snapshot().streams_abandoned, 1);
    }

    #[tokio::test]
    async fn test_chunks_pass_through_in_order() {
        let chunks: Vec<Result<Bytes, PlatformError>> = (0u8..4)
            .map(|i| Ok(Bytes::from(vec![i; 3])))
            .collect();
        let metrics = Arc::new(Metrics::new());
        let relay = MediaStream::new(Box::pin(stream::iter(chunks)), 1, content(), metrics.clone());

        let out: Vec<Bytes> = relay.map(|c| c.unwrap()).collect().await;
        assert_eq!(out.len(), 4);
        assert_eq!(out[3], Bytes::from(vec![3u8; 3]));

        let snap = metrics.snapshot();
        assert_eq!(snap.streams_completed, 1);
        assert_eq!(snap.bytes_relayed, 12);
    }
}
