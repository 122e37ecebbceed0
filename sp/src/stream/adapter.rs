//! Adapter from an observable to `futures::Stream`

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

use super::{Observable, Observer, StreamError, Subscription};

struct ChannelObserver<T> {
    tx: Option<UnboundedSender<Result<T, StreamError>>>,
}

impl<T: Send> Observer<T> for ChannelObserver<T> {
    fn on_next(&mut self, item: T) {
        if let Some(tx) = &self.tx {
            let _ = tx.unbounded_send(Ok(item));
        }
    }

    fn on_error(&mut self, error: StreamError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.unbounded_send(Err(error));
        }
    }

    fn on_completed(&mut self) {
        self.tx = None;
    }
}

/// Subscription exposed as a `futures::Stream` of results
///
/// The stream ends after completion or after yielding the error. Dropping it
/// unsubscribes.
pub struct ObservableStream<T> {
    rx: UnboundedReceiver<Result<T, StreamError>>,
    subscription: Subscription,
}

impl<T: Send + 'static> ObservableStream<T> {
    pub fn subscribe<O: Observable<T> + ?Sized>(source: &O) -> Self {
        let (tx, rx) = unbounded();
        let subscription = source.subscribe(Box::new(ChannelObserver { tx: Some(tx) }));
        Self { rx, subscription }
    }
}

impl<T> ObservableStream<T> {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Stream for ObservableStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().rx).poll_next(cx)
    }
}

impl<T> Drop for ObservableStream<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ObservableExt, Subject, fail, from_iter};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_collects_items_until_completion() {
        let items: Vec<_> = from_iter(vec!["a", "b"]).into_stream().collect().await;
        let items: Vec<_> = items.into_iter().map(|r| r.expect("unexpected error")).collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let mut stream = fail::<u8>(StreamError::msg("broken")).into_stream();
        let first = stream.next().await.expect("stream ended early");
        assert_eq!(first.expect_err("expected error").to_string(), "broken");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let subject = Subject::<u32>::new();
        let stream = subject.into_stream();
        assert_eq!(subject.observer_count(), 1);

        drop(stream);
        assert_eq!(subject.observer_count(), 0);
    }
}
