use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::Full;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Instant;

/// Request body that stamps the moment its last frame is handed to the
/// connection. Bodiless requests never stamp.
#[derive(Debug)]
pub(crate) struct TimedBody {
    inner: Full<Bytes>,
    sent_at: Arc<OnceLock<Instant>>,
}

impl TimedBody {
    pub(crate) fn new(body: Bytes) -> (Self, Arc<OnceLock<Instant>>) {
        let sent_at = Arc::new(OnceLock::new());
        let body = Self {
            inner: Full::new(body),
            sent_at: sent_at.clone(),
        };
        (body, sent_at)
    }
}

impl Body for TimedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        let finished = match &polled {
            Poll::Ready(None) => true,
            Poll::Ready(Some(_)) => this.inner.is_end_stream(),
            Poll::Pending => false,
        };
        if finished {
            let _ = this.sent_at.set(Instant::now());
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
