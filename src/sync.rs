use crate::api::ThreatApi;
use crate::error::Error;
use crate::events::{EventBus, UpdateEvent};
use crate::lists::ThreatListStore;
use crate::storage::{keys, Store};
use crate::types::{
    parse_protocol_duration, ClientInfo, FetchUpdatesRequest, ListIdentity, ListUpdateRequest,
};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Wait applied when the server omits or garbles `minimumWaitDuration`.
pub(crate) const DEFAULT_WAIT_SECS: u64 = 300;

enum CycleOutcome {
    Applied,
    Discarded,
}

/// Drives the periodic update loop. Exactly one cycle is ever in flight:
/// the loop waits, fetches, applies, persists the next deadline, and only
/// then waits again.
pub(crate) struct Synchronizer<S, A> {
    store: S,
    lists: ThreatListStore<S>,
    api: A,
    client: ClientInfo,
    tracked: Vec<ListIdentity>,
    ns: String,
    events: Arc<EventBus>,
    shutdown: watch::Receiver<bool>,
}

impl<S: Store + Clone, A: ThreatApi> Synchronizer<S, A> {
    pub(crate) fn new(
        store: S,
        api: A,
        client: ClientInfo,
        tracked: Vec<ListIdentity>,
        ns: String,
        events: Arc<EventBus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let lists = ThreatListStore::new(store.clone(), ns.clone());
        Self {
            store,
            lists,
            api,
            client,
            tracked,
            ns,
            events,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(lists = self.tracked.len(), "threat list synchronizer started");
        loop {
            match self.wait_for_deadline().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
            self.events.emit(&UpdateEvent::Started);
            match self.run_cycle().await {
                Ok(CycleOutcome::Applied) => self.events.emit(&UpdateEvent::Completed),
                Ok(CycleOutcome::Discarded) => break,
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
        }
        info!("threat list synchronizer stopped");
    }

    fn fail(&self, err: Error) {
        error!(error = %err, "update cycle failed");
        self.events.emit(&UpdateEvent::Failed {
            message: err.to_string(),
        });
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps until the persisted deadline, or returns immediately when
    /// none is stored. `Ok(false)` means shutdown interrupted the wait.
    async fn wait_for_deadline(&mut self) -> Result<bool, Error> {
        if self.stopping() {
            return Ok(false);
        }
        if let Some(wait) = self.remaining_wait().await? {
            self.events.emit(&UpdateEvent::Scheduled {
                next_update_secs: wait.as_secs(),
            });
            debug!(seconds = wait.as_secs(), "next update scheduled");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.changed() => return Ok(false),
            }
        }
        Ok(!self.stopping())
    }

    async fn remaining_wait(&self) -> Result<Option<Duration>, Error> {
        let Some(stored) = self.store.get(&keys::next_update(&self.ns)).await? else {
            return Ok(None);
        };
        let Ok(deadline_ms) = stored.parse::<i64>() else {
            warn!(value = %stored, "ignoring unparseable update deadline");
            return Ok(None);
        };
        let remaining_ms = deadline_ms - Utc::now().timestamp_millis();
        if remaining_ms > 0 {
            Ok(Some(Duration::from_millis(remaining_ms as u64)))
        } else {
            Ok(None)
        }
    }

    async fn run_cycle(&self) -> Result<CycleOutcome, Error> {
        let mut list_update_requests = Vec::with_capacity(self.tracked.len());
        for list in &self.tracked {
            // a never-synced list sends an empty state; the server answers
            // with a full update
            let state = self.lists.state(list).await?.unwrap_or_default();
            list_update_requests.push(ListUpdateRequest {
                threat_type: list.threat_type,
                platform_type: list.platform_type,
                threat_entry_type: list.threat_entry_type,
                state,
            });
        }
        let request = FetchUpdatesRequest {
            client: self.client.clone(),
            list_update_requests,
        };

        let response = self.api.fetch_threat_list_updates(&request).await?;
        if self.stopping() {
            debug!("shutdown requested during fetch, discarding update response");
            return Ok(CycleOutcome::Discarded);
        }

        let wait_secs = response
            .minimum_wait_duration
            .as_deref()
            .and_then(parse_protocol_duration)
            .map(|secs| secs.ceil() as u64)
            .unwrap_or(DEFAULT_WAIT_SECS);

        for update in &response.list_update_responses {
            let list = ListIdentity::new(
                update.threat_type,
                update.platform_type,
                update.threat_entry_type,
            );
            match self.lists.apply_update(&list, update).await {
                Ok(stats) => {
                    counter!("safebrowse_list_updates_applied_total").increment(1);
                    info!(
                        list = %list,
                        added = stats.added,
                        removed = stats.removed,
                        "applied threat list update"
                    );
                }
                Err(Error::Desync { list: code, index }) => {
                    // the replica diverged; dropping the token makes the
                    // next cycle request full state for this list
                    warn!(list = %code, index, "replica out of sync, forcing full resync");
                    self.lists.clear_state(&list).await?;
                }
                Err(err) => return Err(err),
            }
        }

        let next_deadline = Utc::now().timestamp_millis() + (wait_secs as i64) * 1000;
        // persisted before the next wait begins so a restart mid-cycle
        // resumes with the correct deadline instead of re-fetching
        self.store
            .set(&keys::next_update(&self.ns), &next_deadline.to_string())
            .await?;
        debug!(wait_secs, "persisted next update deadline");
        Ok(CycleOutcome::Applied)
    }
}
