//! Killable exports
//!
//! Dropping a COPY stream on the client side does not stop the server: the
//! query keeps running and its output is discarded. [`KillableStream`] wraps
//! a chunk stream and runs a kill action when it is dropped before reaching
//! its end, so an abandoned export releases server resources promptly.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio_postgres::{CancelToken, NoTls};
use tracing::{debug, warn};

use super::ChunkStream;
use crate::error::Result;

/// Stream wrapper that fires `on_abandon` if dropped before exhaustion
pub struct KillableStream<F: FnOnce() + Send + 'static> {
    inner: ChunkStream,
    on_abandon: Option<F>,
}

impl<F: FnOnce() + Send + 'static> KillableStream<F> {
    pub fn new(inner: ChunkStream, on_abandon: F) -> Self {
        Self {
            inner,
            on_abandon: Some(on_abandon),
        }
    }
}

impl<F: FnOnce() + Send + Unpin + 'static> Stream for KillableStream<F> {
    type Item = Result<bytes::Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            // Finished normally; nothing left to kill
            self.on_abandon = None;
        }
        polled
    }
}

impl<F: FnOnce() + Send + 'static> Drop for KillableStream<F> {
    fn drop(&mut self) {
        if let Some(kill) = self.on_abandon.take() {
            kill();
        }
    }
}

/// Kill action sending a cancel request for the running query
///
/// The request goes over a separate connection and is fire-and-forget; the
/// server may already have finished the statement.
pub fn cancel_query(token: CancelToken) -> impl FnOnce() + Send + Unpin + 'static {
    move || match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                debug!("Cancelling abandoned COPY on the server");
                if let Err(e) = token.cancel_query(NoTls).await {
                    warn!("Failed to cancel server-side query: {}", e);
                }
            });
        }
        Err(_) => warn!("No runtime available to cancel server-side query"),
    }
}
