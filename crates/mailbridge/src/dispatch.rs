//! Fan-out of listener events to registered consumers.
//!
//! Every event is delivered to each consumer on its own task, so a slow or
//! failing consumer never holds up the others or the poll loop. A
//! consumer's failure is logged and otherwise ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::Error;
use crate::message::EmailMessage;

/// What a consumer callback returns.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives events from an [`EmailListener`](crate::listener::EmailListener).
#[async_trait]
pub trait EmailConsumer: Send + Sync {
    /// Registration key. Registering a second consumer with the same
    /// identity replaces the first.
    fn identity(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once for every message read from the store.
    async fn on_message(&self, message: &EmailMessage) -> HandlerResult;

    /// Called when a poll cycle fails.
    async fn on_error(&self, error: &Error) -> HandlerResult {
        error!(consumer = self.identity(), %error, "unhandled listener error");
        Ok(())
    }

    /// Called once when the listener closes, with the close failure if
    /// there was one.
    async fn on_close(&self, _error: Option<&Error>) -> HandlerResult {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Event {
    Message(Arc<EmailMessage>),
    Error(Arc<Error>),
    Close(Option<Arc<Error>>),
}

impl Event {
    const fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Error(_) => "error",
            Self::Close(_) => "close",
        }
    }

    async fn deliver(&self, consumer: &dyn EmailConsumer) -> HandlerResult {
        match self {
            Self::Message(message) => consumer.on_message(message).await,
            Self::Error(error) => consumer.on_error(error).await,
            Self::Close(error) => consumer.on_close(error.as_deref()).await,
        }
    }
}

/// Consumers keyed by identity.
#[derive(Default)]
pub struct ConsumerRegistry {
    consumers: BTreeMap<&'static str, Arc<dyn EmailConsumer>>,
}

impl std::fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.consumers.keys()).finish()
    }
}

impl ConsumerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `consumer`, returning the one it replaced.
    pub fn register(&mut self, consumer: Arc<dyn EmailConsumer>) -> Option<Arc<dyn EmailConsumer>> {
        let identity = consumer.identity();
        let previous = self.consumers.insert(identity, consumer);
        if previous.is_some() {
            debug!(identity, "consumer replaced");
        }
        previous
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Delivers `message` to every consumer.
    #[must_use]
    pub fn dispatch_message(&self, message: EmailMessage) -> DispatchHandle {
        self.fan_out(Event::Message(Arc::new(message)))
    }

    /// Delivers a poll failure to every consumer.
    #[must_use]
    pub fn dispatch_error(&self, error: Error) -> DispatchHandle {
        self.fan_out(Event::Error(Arc::new(error)))
    }

    /// Notifies every consumer that the listener closed.
    #[must_use]
    pub fn dispatch_close(&self, error: Option<Error>) -> DispatchHandle {
        self.fan_out(Event::Close(error.map(Arc::new)))
    }

    fn fan_out(&self, event: Event) -> DispatchHandle {
        let tasks = self
            .consumers
            .values()
            .map(|consumer| {
                let consumer = Arc::clone(consumer);
                let event = event.clone();
                tokio::spawn(async move {
                    match event.deliver(consumer.as_ref()).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(
                                consumer = consumer.identity(),
                                event = event.name(),
                                error = %e,
                                "consumer failed"
                            );
                            false
                        }
                    }
                })
            })
            .collect();
        DispatchHandle { tasks }
    }
}

/// The consumer tasks started for one event.
///
/// Dropping the handle detaches the tasks; they still run to completion.
#[derive(Debug)]
pub struct DispatchHandle {
    tasks: Vec<JoinHandle<bool>>,
}

impl DispatchHandle {
    /// A handle with no tasks.
    #[must_use]
    pub const fn empty() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Number of consumer tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task was started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task and returns how many failed or panicked.
    pub async fn join(self) -> usize {
        let mut failed = 0;
        for task in self.tasks {
            match task.await {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) => {
                    error!(error = %e, "consumer task panicked");
                    failed += 1;
                }
            }
        }
        failed
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        subjects: Mutex<Vec<String>>,
        errors: Mutex<Vec<&'static str>>,
        closed: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl EmailConsumer for Recorder {
        async fn on_message(&self, message: &EmailMessage) -> HandlerResult {
            self.subjects.lock().unwrap().push(message.subject.clone());
            Ok(())
        }

        async fn on_error(&self, error: &Error) -> HandlerResult {
            self.errors.lock().unwrap().push(error.kind());
            Ok(())
        }

        async fn on_close(&self, error: Option<&Error>) -> HandlerResult {
            self.closed.lock().unwrap().push(error.is_some());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EmailConsumer for Failing {
        async fn on_message(&self, _message: &EmailMessage) -> HandlerResult {
            Err("handler refused the message".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl EmailConsumer for Panicking {
        async fn on_message(&self, _message: &EmailMessage) -> HandlerResult {
            panic!("handler bug");
        }
    }

    fn message(subject: &str) -> EmailMessage {
        EmailMessage::new("a@x.org", subject, "body")
    }

    #[tokio::test]
    async fn every_consumer_receives_the_message() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = ConsumerRegistry::new();
        registry.register(recorder.clone());
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Panicking));
        assert_eq!(registry.len(), 3);

        let handle = registry.dispatch_message(message("hello"));
        assert_eq!(handle.len(), 3);
        assert_eq!(handle.join().await, 2);
        assert_eq!(*recorder.subjects.lock().unwrap(), ["hello"]);
    }

    #[tokio::test]
    async fn same_identity_replaces() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut registry = ConsumerRegistry::new();
        assert!(registry.register(first.clone()).is_none());
        assert!(registry.register(second.clone()).is_some());
        assert_eq!(registry.len(), 1);

        registry.dispatch_message(message("once")).join().await;
        assert!(first.subjects.lock().unwrap().is_empty());
        assert_eq!(second.subjects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn errors_and_close_are_delivered() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = ConsumerRegistry::new();
        registry.register(recorder.clone());

        let failed = registry
            .dispatch_error(Error::Read("connection reset".into()))
            .join()
            .await;
        assert_eq!(failed, 0);
        registry
            .dispatch_close(Some(Error::Close("gone".into())))
            .join()
            .await;
        registry.dispatch_close(None).join().await;

        assert_eq!(*recorder.errors.lock().unwrap(), ["ReadError"]);
        assert_eq!(*recorder.closed.lock().unwrap(), [true, false]);
    }

    #[tokio::test]
    async fn default_handlers_succeed() {
        let mut registry = ConsumerRegistry::new();
        registry.register(Arc::new(Failing));

        assert_eq!(registry.dispatch_error(Error::PollInterrupted).join().await, 0);
        assert_eq!(registry.dispatch_close(None).join().await, 0);
    }

    #[tokio::test]
    async fn empty_registry_starts_nothing() {
        let registry = ConsumerRegistry::new();
        assert!(registry.is_empty());
        let handle = registry.dispatch_message(message("nobody"));
        assert!(handle.is_empty());
        assert_eq!(handle.join().await, 0);
        assert_eq!(DispatchHandle::empty().join().await, 0);
    }
}
