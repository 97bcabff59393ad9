//! Push side of a caller's output stream.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// The consumer side of the output stream went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("output stream was cancelled")]
pub struct StreamCancelled;

/// Bounded, channel-backed output sink.
///
/// The consumer reads a `Stream` of `Result<T, E>`. Dropping that stream is
/// the cancellation signal observed by `is_cancelled` and `cancelled`.
#[derive(Debug)]
pub struct StreamEmitter<T, E> {
    sender: mpsc::Sender<Result<T, E>>,
}

/// Creates an emitter and the stream it feeds.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn stream_channel<T, E>(
    capacity: usize,
) -> (StreamEmitter<T, E>, ReceiverStream<Result<T, E>>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (StreamEmitter { sender }, ReceiverStream::new(receiver))
}

impl<T, E> StreamEmitter<T, E> {
    /// Hands one item to the consumer, waiting for capacity.
    ///
    /// # Errors
    ///
    /// Returns `StreamCancelled` if the consumer is gone.
    pub async fn emit(&self, item: T) -> Result<(), StreamCancelled> {
        self.sender.send(Ok(item)).await.map_err(|_| StreamCancelled)
    }

    /// Hands a terminal error to the consumer.
    ///
    /// # Errors
    ///
    /// Returns `StreamCancelled` if the consumer is gone.
    pub async fn fail(&self, error: E) -> Result<(), StreamCancelled> {
        self.sender.send(Err(error)).await.map_err(|_| StreamCancelled)
    }

    /// Ends the stream successfully.
    pub fn complete(self) {
        drop(self);
    }

    /// True once the consumer has dropped the stream.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves when the consumer drops the stream.
    pub async fn cancelled(&self) {
        self.sender.closed().await;
    }
}
