//! Periodic inbox polling with consumer dispatch.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ListenerConfig;
use crate::dispatch::{ConsumerRegistry, DispatchHandle, EmailConsumer};
use crate::store::MailStoreClient;
use crate::{Error, Result};

/// Polls one mail store folder and hands each message to the registered
/// consumers.
///
/// Cloning is cheap; clones share the store connection and the registry.
#[derive(Clone)]
pub struct EmailListener {
    config: Arc<ListenerConfig>,
    store: Arc<Mutex<MailStoreClient>>,
    consumers: Arc<RwLock<ConsumerRegistry>>,
}

impl std::fmt::Debug for EmailListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailListener")
            .field("host", &self.config.host)
            .field("protocol", &self.config.protocol)
            .field("folder", &self.config.folder)
            .finish_non_exhaustive()
    }
}

impl EmailListener {
    /// Connects to the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the store cannot be opened.
    pub async fn new(config: ListenerConfig) -> Result<Self> {
        let client = MailStoreClient::open(
            config.protocol,
            &config.host,
            &config.username,
            &config.password,
            config.store_settings(),
        )
        .await
        .map_err(|e| match e {
            Error::Init(_) => e,
            other => Error::Init(other.to_string()),
        })?;
        Ok(Self::from_client(config, client))
    }

    /// Wraps an already opened store client.
    #[must_use]
    pub fn from_client(config: ListenerConfig, client: MailStoreClient) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(Mutex::new(client)),
            consumers: Arc::new(RwLock::new(ConsumerRegistry::new())),
        }
    }

    /// Registers a consumer, replacing any with the same identity.
    pub fn register(&self, consumer: Arc<dyn EmailConsumer>) {
        let identity = consumer.identity();
        self.consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(consumer);
        info!(identity, "consumer registered");
    }

    /// Runs one poll cycle.
    ///
    /// Reads at most one message and delivers it, or the read failure, to
    /// every consumer. The returned handle can be awaited to wait for the
    /// consumers.
    pub async fn poll(&self) -> DispatchHandle {
        let result = self.store.lock().await.read_once(&self.config.folder).await;
        let consumers = self.consumers.read().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(Some(message)) => {
                debug!(subject = %message.subject, "dispatching message");
                consumers.dispatch_message(message)
            }
            Ok(None) => {
                debug!(folder = %self.config.folder, "no unseen message");
                DispatchHandle::empty()
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "poll failed");
                consumers.dispatch_error(e)
            }
        }
    }

    /// Starts polling every `polling_interval` until `cancel` fires.
    ///
    /// The first cycle runs immediately. A cycle that overruns the interval
    /// delays the next one instead of bunching them up.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let listener = self.clone();
        let period = self.config.polling_interval.max(Duration::from_millis(1));
        info!(period_ms = period.as_millis(), folder = %self.config.folder, "listener started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        drop(listener.poll().await);
                    }
                }
            }
            info!("listener stopped");
        })
    }

    /// Closes the store and notifies every consumer.
    ///
    /// A close failure is passed to the consumers, not returned.
    pub async fn close(&self) -> DispatchHandle {
        let result = self.store.lock().await.close().await;
        let error = result.err();
        if let Some(e) = &error {
            warn!(error = %e, "closing the mail store failed");
        }
        self.consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch_close(error)
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
    use crate::dispatch::HandlerResult;
    use crate::message::EmailMessage;
    use crate::store::{MailStore, UnseenMessage};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct Scripted {
        inbox: Arc<std::sync::Mutex<VecDeque<Result<Option<&'static str>>>>>,
        close: Result<()>,
    }

    #[async_trait]
    impl MailStore for Scripted {
        async fn fetch_unseen(&mut self, _folder: &str) -> Result<Option<UnseenMessage>> {
            let next = self.inbox.lock().unwrap().pop_front().unwrap_or(Ok(None));
            next.map(|raw| {
                raw.map(|raw| UnseenMessage {
                    id: 1,
                    raw: raw.as_bytes().to_vec(),
                })
            })
        }

        async fn mark_consumed(&mut self, _id: u32) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.close.clone()
        }
    }

    #[derive(Default)]
    struct Collector {
        subjects: std::sync::Mutex<Vec<String>>,
        errors: std::sync::Mutex<Vec<String>>,
        closes: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl EmailConsumer for Collector {
        async fn on_message(&self, message: &EmailMessage) -> HandlerResult {
            self.subjects.lock().unwrap().push(message.subject.clone());
            Ok(())
        }

        async fn on_error(&self, error: &Error) -> HandlerResult {
            self.errors.lock().unwrap().push(error.kind().to_string());
            Ok(())
        }

        async fn on_close(&self, error: Option<&Error>) -> HandlerResult {
            self.closes.lock().unwrap().push(error.map(|e| e.kind().to_string()));
            Ok(())
        }
    }

    fn listener(
        script: Vec<Result<Option<&'static str>>>,
        close: Result<()>,
    ) -> (EmailListener, Arc<Collector>) {
        let store = Scripted {
            inbox: Arc::new(std::sync::Mutex::new(script.into())),
            close,
        };
        let listener = EmailListener::from_client(
            ListenerConfig {
                polling_interval: Duration::from_secs(1),
                ..ListenerConfig::default()
            },
            MailStoreClient::from_store(Box::new(store)),
        );
        let collector = Arc::new(Collector::default());
        listener.register(collector.clone());
        (listener, collector)
    }

    #[tokio::test]
    async fn poll_dispatches_message_then_nothing() {
        let (listener, collector) =
            listener(vec![Ok(Some("Subject: hi\r\n\r\nbody"))], Ok(()));

        assert_eq!(listener.poll().await.join().await, 0);
        let idle = listener.poll().await;
        assert!(idle.is_empty());

        assert_eq!(*collector.subjects.lock().unwrap(), ["hi"]);
        assert!(collector.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn poll_failure_goes_to_on_error() {
        let (listener, collector) = listener(
            vec![
                Err(Error::Read("connection reset".into())),
                Ok(Some("Content-Type: application/json\r\n\r\nnot json")),
            ],
            Ok(()),
        );

        listener.poll().await.join().await;
        listener.poll().await.join().await;

        assert_eq!(*collector.errors.lock().unwrap(), ["ReadError", "CodecError"]);
        assert!(collector.subjects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_failure_reaches_on_close() {
        let (listener, collector) = listener(Vec::new(), Err(Error::Close("socket gone".into())));

        listener.close().await.join().await;
        assert_eq!(
            *collector.closes.lock().unwrap(),
            [Some("CloseError".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_polls_on_interval_until_cancelled() {
        let (listener, collector) = listener(
            vec![
                Ok(None),
                Ok(Some("Subject: one\r\n\r\n1")),
                Ok(None),
                Ok(Some("Subject: two\r\n\r\n2")),
            ],
            Ok(()),
        );
        let cancel = CancellationToken::new();
        let task = listener.start(cancel.clone());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        task.await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(*collector.subjects.lock().unwrap(), ["one", "two"]);
    }

    #[tokio::test]
    async fn closed_listener_reports_read_errors() {
        let (listener, collector) = listener(vec![Ok(Some("Subject: late\r\n\r\nx"))], Ok(()));

        listener.close().await.join().await;
        listener.poll().await.join().await;

        assert_eq!(*collector.closes.lock().unwrap(), [None]);
        assert_eq!(*collector.errors.lock().unwrap(), ["ReadError"]);
    }
}
