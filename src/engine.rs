use crate::api::{HttpThreatApi, ThreatApi};
use crate::config::Config;
use crate::error::Error;
use crate::events::{EventBus, EventKind, UpdateEvent};
use crate::matcher::Matcher;
use crate::storage::{keys, RedisStore, Store};
use crate::sync::Synchronizer;
use crate::types::MatchRecord;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The public face of the engine: owns the store and API handles, runs
/// the synchronizer as a background task, and serves lookups.
pub struct SafeBrowser<S, A> {
    config: Config,
    store: S,
    api: A,
    matcher: Matcher<S, A>,
    events: Arc<EventBus>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl SafeBrowser<RedisStore, HttpThreatApi> {
    /// Connects the production backends: Redis for state, HTTPS for the
    /// remote threat service.
    pub async fn connect(config: Config) -> Result<Self, Error> {
        let store = RedisStore::connect(&config.redis_url).await?;
        let api = HttpThreatApi::new(&config.endpoint, &config.api_key)?;
        Ok(Self::with_backends(config, store, api))
    }
}

impl<S, A> SafeBrowser<S, A>
where
    S: Store + Clone + 'static,
    A: ThreatApi + Clone + 'static,
{
    pub fn with_backends(config: Config, store: S, api: A) -> Self {
        let matcher = Matcher::new(
            store.clone(),
            api.clone(),
            config.client_info(),
            config.key_prefix.clone(),
            config.prefix_bytes,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            store,
            api,
            matcher,
            events: Arc::new(EventBus::new()),
            shutdown_tx,
            shutdown_rx,
            sync_task: Mutex::new(None),
        }
    }

    /// Spawns the synchronization loop. A second call while the loop is
    /// alive is ignored; only one update cycle may be in flight.
    pub fn start(&self) {
        let mut task = self.sync_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("synchronizer already running, ignoring start");
            return;
        }
        let synchronizer = Synchronizer::new(
            self.store.clone(),
            self.api.clone(),
            self.config.client_info(),
            self.config.lists.clone(),
            self.config.key_prefix.clone(),
            Arc::clone(&self.events),
            self.shutdown_rx.clone(),
        );
        *task = Some(tokio::spawn(synchronizer.run()));
    }

    /// Halts the loop. A pending wait is cancelled immediately; an
    /// in-flight fetch finishes but its response is discarded. Idempotent;
    /// the loop does not restart afterwards.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("synchronizer stop requested");
    }

    /// Looks up a URL against the local replica, confirming prefix hits
    /// through the full-hash cache or the remote service. Fails with
    /// [`Error::NotReady`] until the first successful synchronization has
    /// persisted an update deadline.
    pub async fn check(&self, url: &str) -> Result<Vec<MatchRecord>, Error> {
        let initialized = self
            .store
            .get(&keys::next_update(&self.config.key_prefix))
            .await?
            .is_some();
        if !initialized {
            return Err(Error::NotReady);
        }
        self.matcher.check(url).await
    }

    /// Registers a listener for update lifecycle events. Listeners fire
    /// synchronously in registration order.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener);
    }
}
