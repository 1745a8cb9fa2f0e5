use crate::models::Person;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use service_core::error::AppError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A stream of stored persons. An `Err` item ends the stream.
pub type PersonStream = BoxStream<'static, Result<Person, AppError>>;

/// Channel-backed stream handed out by [`PersonRepository::find_by_name`].
pub type PersonReceiver = ReceiverStream<Result<Person, AppError>>;

/// Buffer between the forwarding task and a [`PersonReceiver`].
pub const ADAPTER_BUFFER: usize = 32;

#[async_trait]
pub trait PersonRepository: Send + Sync {
    /// Persist a person, returning it with the id the store assigned.
    async fn save(&self, person: Person) -> Result<Person, AppError>;

    /// All persons with exactly this name, in insertion order.
    async fn find_all_by_name(&self, name: &str) -> Result<PersonStream, AppError>;

    /// Every stored person, then each newly inserted one as it arrives.
    /// The stream does not complete on its own.
    async fn tail(&self) -> Result<PersonStream, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;

    /// Same filter as [`find_all_by_name`](Self::find_all_by_name), delivered
    /// through a bounded channel fed by a spawned task.
    async fn find_by_name(&self, name: &str) -> Result<PersonReceiver, AppError> {
        let stream = self.find_all_by_name(name).await?;
        Ok(into_receiver(stream, ADAPTER_BUFFER))
    }
}

/// Drain `stream` into a channel from a spawned task.
///
/// The task stops after forwarding an error, at the end of the stream, or as
/// soon as the receiving side is dropped.
pub fn into_receiver(mut stream: PersonStream, buffer: usize) -> PersonReceiver {
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                _ = tx.closed() => break,
                item = stream.next() => item,
            };

            let Some(item) = item else { break };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
        tracing::trace!("Person stream adapter finished");
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_into_receiver_forwards_in_order() {
        let source = stream::iter(vec![Ok(Person::new("Jon")), Ok(Person::new("Rob"))]).boxed();

        let names: Vec<String> = into_receiver(source, 1)
            .map(|p| p.unwrap().name)
            .collect()
            .await;

        assert_eq!(names, vec!["Jon", "Rob"]);
    }

    #[tokio::test]
    async fn test_into_receiver_stops_after_error() {
        let source = stream::iter(vec![
            Ok(Person::new("Jon")),
            Err(AppError::ServiceUnavailable),
            Ok(Person::new("Rob")),
        ])
        .boxed();

        let items: Vec<_> = into_receiver(source, 4).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(AppError::ServiceUnavailable)));
    }

    #[tokio::test]
    async fn test_into_receiver_stops_when_dropped() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = stream::repeat_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Person::new("Hodor"))
        })
        .boxed();

        let mut rx = into_receiver(source, 1);
        assert!(rx.next().await.unwrap().is_ok());
        drop(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_drop = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(pulled.load(Ordering::SeqCst), after_drop);
    }
}
