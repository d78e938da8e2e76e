//! Stream adaptor that enforces the single-terminal-event contract.

use crate::error::ProviderError;
use crate::types::StreamEvent;
use futures::stream::{FusedStream, Stream};
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Wraps an event stream so that it ends right after its first terminal
/// event, and synthesizes an `IncompleteStream` error if the inner stream
/// ends without one.
#[pin_project]
#[derive(Debug)]
pub struct Terminated<S> {
    #[pin]
    inner: S,
    finished: bool,
}

impl<S> Terminated<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            finished: false,
        }
    }
}

impl<S> Stream for Terminated<S>
where
    S: Stream<Item = StreamEvent>,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_next(cx)) {
            Some(event) => {
                if event.is_terminal() {
                    *this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            None => {
                *this.finished = true;
                Poll::Ready(Some(StreamEvent::Error(ProviderError::IncompleteStream(
                    "provider stream ended without a terminal event".to_string(),
                ))))
            }
        }
    }
}

impl<S> FusedStream for Terminated<S>
where
    S: Stream<Item = StreamEvent>,
{
    fn is_terminated(&self) -> bool {
        self.finished
    }
}
