use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use safebrowse::hashes::{hash_expression, DEFAULT_PREFIX_BYTES};
use safebrowse::types::{
    FetchUpdatesRequest, FetchUpdatesResponse, FindFullHashesRequest, FindFullHashesResponse,
    ListIdentity, ListUpdateResponse, PlatformType, RawHashes, RawIndices, ResponseType,
    ThreatEntry, ThreatEntrySet, ThreatEntryType, ThreatMatch, ThreatType,
};
use safebrowse::{
    Config, Error, EventKind, MemoryStore, SafeBrowser, ThreatApi, ThreatListStore, UpdateEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safebrowse=debug".into()),
        )
        .try_init();
}

#[derive(Clone, Default)]
struct MockApi {
    fetch_response: Arc<Mutex<FetchUpdatesResponse>>,
    find_response: Arc<Mutex<FindFullHashesResponse>>,
    fetch_calls: Arc<AtomicUsize>,
    find_calls: Arc<AtomicUsize>,
    fail_fetch: Arc<AtomicBool>,
}

impl MockApi {
    fn set_fetch_response(&self, response: FetchUpdatesResponse) {
        *self.fetch_response.lock().unwrap() = response;
    }

    fn set_find_response(&self, response: FindFullHashesResponse) {
        *self.find_response.lock().unwrap() = response;
    }

    fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThreatApi for MockApi {
    async fn fetch_threat_list_updates(
        &self,
        _request: &FetchUpdatesRequest,
    ) -> Result<FetchUpdatesResponse, Error> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::RemoteService("simulated outage".to_string()));
        }
        Ok(self.fetch_response.lock().unwrap().clone())
    }

    async fn find_full_hashes(
        &self,
        _request: &FindFullHashesRequest,
    ) -> Result<FindFullHashesResponse, Error> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.find_response.lock().unwrap().clone())
    }
}

fn malware_list() -> ListIdentity {
    ListIdentity::new(
        ThreatType::Malware,
        PlatformType::AnyPlatform,
        ThreatEntryType::Url,
    )
}

fn test_config() -> Config {
    let mut config = Config::new("test-key");
    config.lists = vec![malware_list()];
    config
}

fn full_update_with_prefixes(prefixes: &[&[u8]], state: &str) -> FetchUpdatesResponse {
    let list = malware_list();
    let mut raw = Vec::new();
    for prefix in prefixes {
        raw.extend_from_slice(prefix);
    }
    FetchUpdatesResponse {
        list_update_responses: vec![ListUpdateResponse {
            threat_type: list.threat_type,
            platform_type: list.platform_type,
            threat_entry_type: list.threat_entry_type,
            response_type: ResponseType::FullUpdate,
            additions: vec![ThreatEntrySet {
                raw_hashes: Some(RawHashes {
                    prefix_size: DEFAULT_PREFIX_BYTES,
                    raw_hashes: BASE64.encode(&raw),
                }),
                raw_indices: None,
            }],
            removals: Vec::new(),
            new_client_state: state.to_string(),
        }],
        minimum_wait_duration: Some("300s".to_string()),
    }
}

fn match_for_hash(full_hash_b64: &str) -> FindFullHashesResponse {
    let list = malware_list();
    FindFullHashesResponse {
        matches: vec![ThreatMatch {
            threat_type: list.threat_type,
            platform_type: list.platform_type,
            threat_entry_type: list.threat_entry_type,
            threat: ThreatEntry {
                hash: full_hash_b64.to_string(),
            },
            cache_duration: Some("300s".to_string()),
        }],
        negative_cache_duration: None,
        minimum_wait_duration: None,
    }
}

async fn wait_for_event(
    browser: &SafeBrowser<MemoryStore, MockApi>,
    kind: EventKind,
) -> UpdateEvent {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    browser.on(kind, move |event| {
        let _ = tx.send(event.clone());
    });
    browser.start();
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn check_before_first_sync_is_not_ready() {
    init_tracing();
    let browser = SafeBrowser::with_backends(test_config(), MemoryStore::new(), MockApi::default());
    let result = browser.check("http://evil.com/path").await;
    assert!(matches!(result, Err(Error::NotReady)));
}

#[tokio::test]
async fn full_sync_then_check_confirms_and_caches_a_match() {
    init_tracing();
    let store = MemoryStore::new();
    let api = MockApi::default();

    let seeded = hash_expression("evil.com/", DEFAULT_PREFIX_BYTES);
    api.set_fetch_response(full_update_with_prefixes(&[seeded.prefix.as_slice()], "state-1"));
    api.set_find_response(match_for_hash(&seeded.full_b64()));

    let browser = SafeBrowser::with_backends(test_config(), store, api.clone());
    let completed = wait_for_event(&browser, EventKind::Completed).await;
    assert_eq!(completed, UpdateEvent::Completed);

    // partial match on evil.com/, confirmed through one remote call
    let matches = browser.check("http://evil.com/path").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].threat_hash, seeded.full_b64());
    assert_eq!(matches[0].threat_type, ThreatType::Malware);
    assert_eq!(matches[0].client_state, "state-1");
    assert_eq!(api.find_calls(), 1);

    // second lookup inside the TTL is served from the cache
    let again = browser.check("http://evil.com/path").await.unwrap();
    assert_eq!(again, matches);
    assert_eq!(api.find_calls(), 1);

    // an unlisted URL produces no partial match and no remote call
    let clean = browser.check("http://good.example/").await.unwrap();
    assert!(clean.is_empty());
    assert_eq!(api.find_calls(), 1);

    browser.stop();
}

#[tokio::test]
async fn unrelated_full_hashes_from_the_service_are_discarded() {
    init_tracing();
    let store = MemoryStore::new();
    let api = MockApi::default();

    let seeded = hash_expression("evil.com/", DEFAULT_PREFIX_BYTES);
    api.set_fetch_response(full_update_with_prefixes(&[seeded.prefix.as_slice()], "state-1"));
    let unrelated = hash_expression("unrelated.example/", DEFAULT_PREFIX_BYTES);
    api.set_find_response(match_for_hash(&unrelated.full_b64()));

    let browser = SafeBrowser::with_backends(test_config(), store, api.clone());
    wait_for_event(&browser, EventKind::Completed).await;

    let matches = browser.check("http://evil.com/").await.unwrap();
    assert!(matches.is_empty());
    assert_eq!(api.find_calls(), 1);

    // nothing was cached, so the next lookup asks again
    let matches = browser.check("http://evil.com/").await.unwrap();
    assert!(matches.is_empty());
    assert_eq!(api.find_calls(), 2);

    browser.stop();
}

#[tokio::test]
async fn failed_fetch_emits_failed_and_persists_no_deadline() {
    init_tracing();
    let api = MockApi::default();
    api.fail_fetch.store(true, Ordering::SeqCst);

    let browser = SafeBrowser::with_backends(test_config(), MemoryStore::new(), api);
    let failed = wait_for_event(&browser, EventKind::Failed).await;
    assert!(matches!(failed, UpdateEvent::Failed { .. }));

    // no deadline was persisted, so lookups still report NotReady
    let result = browser.check("http://evil.com/").await;
    assert!(matches!(result, Err(Error::NotReady)));
}

#[tokio::test]
async fn out_of_range_removal_forces_a_full_resync() {
    init_tracing();
    let store = MemoryStore::new();
    let api = MockApi::default();
    let list = malware_list();
    let config = test_config();

    // seed the replica directly with two prefixes
    let lists = ThreatListStore::new(store.clone(), config.key_prefix.clone());
    let seeded = hash_expression("evil.com/", DEFAULT_PREFIX_BYTES);
    let other = hash_expression("other.example/", DEFAULT_PREFIX_BYTES);
    let mut raw = Vec::new();
    raw.extend_from_slice(&seeded.prefix);
    raw.extend_from_slice(&other.prefix);
    lists
        .apply_update(
            &list,
            &ListUpdateResponse {
                threat_type: list.threat_type,
                platform_type: list.platform_type,
                threat_entry_type: list.threat_entry_type,
                response_type: ResponseType::FullUpdate,
                additions: vec![ThreatEntrySet {
                    raw_hashes: Some(RawHashes {
                        prefix_size: DEFAULT_PREFIX_BYTES,
                        raw_hashes: BASE64.encode(&raw),
                    }),
                    raw_indices: None,
                }],
                removals: Vec::new(),
                new_client_state: "state-1".to_string(),
            },
        )
        .await
        .unwrap();

    // the server answers with a removal index far past the sequence
    api.set_fetch_response(FetchUpdatesResponse {
        list_update_responses: vec![ListUpdateResponse {
            threat_type: list.threat_type,
            platform_type: list.platform_type,
            threat_entry_type: list.threat_entry_type,
            response_type: ResponseType::PartialUpdate,
            additions: Vec::new(),
            removals: vec![ThreatEntrySet {
                raw_hashes: None,
                raw_indices: Some(RawIndices { indices: vec![99] }),
            }],
            new_client_state: "state-2".to_string(),
        }],
        minimum_wait_duration: Some("300s".to_string()),
    });

    let browser = SafeBrowser::with_backends(config, store, api);
    wait_for_event(&browser, EventKind::Completed).await;

    // the bad diff was not applied and the version token is gone, so the
    // next cycle requests full state
    assert_eq!(lists.state(&list).await.unwrap(), None);
    assert_eq!(lists.prefix_count(&list).await.unwrap(), (2, 2));

    browser.stop();
}

#[tokio::test]
async fn next_cycle_is_scheduled_after_completion() {
    init_tracing();
    let api = MockApi::default();
    let seeded = hash_expression("evil.com/", DEFAULT_PREFIX_BYTES);
    api.set_fetch_response(full_update_with_prefixes(&[seeded.prefix.as_slice()], "state-1"));

    let browser = SafeBrowser::with_backends(test_config(), MemoryStore::new(), api);
    let scheduled = wait_for_event(&browser, EventKind::Scheduled).await;
    match scheduled {
        UpdateEvent::Scheduled { next_update_secs } => {
            assert!(
                (295..=300).contains(&next_update_secs),
                "unexpected wait: {next_update_secs}"
            );
        }
        other => panic!("expected a scheduled event, got {other:?}"),
    }
    browser.stop();
}
