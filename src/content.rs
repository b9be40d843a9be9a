//! Reactive cache of public content fragments
//!
//! Site copy (titles, homepage variants) is public and fetched without a
//! session. The cache holds the latest complete snapshot of a fixed key
//! set and pushes every new snapshot to its subscribers.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use crate::auth::ApiClient;
use crate::error::ApiResult;

/// Content fragments the site renders
pub const CONTENT_KEYS: [&str; 4] = [
    "site-title",
    "site-home-logged-out",
    "site-home-empty",
    "site-home-normal",
];

/// Where content fragments come from
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_content(&self, ids: &[&str]) -> ApiResult<BTreeMap<String, String>>;
}

#[async_trait]
impl ContentSource for ApiClient {
    async fn fetch_content(&self, ids: &[&str]) -> ApiResult<BTreeMap<String, String>> {
        self.fetch_public_content(ids).await
    }
}

/// The complete content mapping at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ContentSnapshot {
    values: BTreeMap<String, String>,
}

impl ContentSnapshot {
    /// Every key mapped to an empty string
    pub fn empty_for(keys: &[&str]) -> Self {
        Self {
            values: keys.iter().map(|k| (k.to_string(), String::new())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl From<BTreeMap<String, String>> for ContentSnapshot {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

type Callback = Box<dyn Fn(Arc<ContentSnapshot>) + Send + Sync>;

/// A subscriber plus the newest refresh it has already seen
struct Listener {
    callback: Callback,
    delivered: Mutex<Option<u64>>,
}

impl Listener {
    fn new(callback: Callback) -> Self {
        Self {
            callback,
            delivered: Mutex::new(None),
        }
    }

    /// Call back with `snapshot` unless something newer was delivered already
    fn deliver(&self, seq: u64, snapshot: Arc<ContentSnapshot>) {
        let mut delivered = self
            .delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if delivered.is_some_and(|last| last >= seq) {
            return;
        }
        *delivered = Some(seq);
        (self.callback)(snapshot);
    }
}

/// The applied snapshot and the number of the refresh that produced it
struct Applied {
    seq: u64,
    snapshot: Arc<ContentSnapshot>,
}

/// Latest content snapshot plus the listeners watching it
pub struct ContentCache {
    source: Arc<dyn ContentSource>,
    keys: Vec<String>,
    applied: RwLock<Applied>,
    // Refresh numbers start at 1; the empty initial snapshot is 0
    next_seq: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Arc<Listener>>>,
    next_listener_id: AtomicU64,
}

impl ContentCache {
    /// Cache of [`CONTENT_KEYS`] fed by `source`
    ///
    /// Starts with every key empty and spawns one refresh in the background.
    /// A failure of that refresh is logged and otherwise ignored.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(source: Arc<dyn ContentSource>) -> Arc<Self> {
        Self::with_keys(source, &CONTENT_KEYS)
    }

    /// Same as [`ContentCache::new`] for a different key set
    pub fn with_keys(source: Arc<dyn ContentSource>, keys: &[&str]) -> Arc<Self> {
        let cache = Self::empty(source, keys);

        let background = Arc::clone(&cache);
        tokio::spawn(async move {
            if let Err(e) = background.refresh().await {
                tracing::warn!("Initial content refresh failed: {}", e);
            }
        });

        cache
    }

    /// Cache of [`CONTENT_KEYS`] whose first refresh is awaited instead of
    /// spawned, so its failure reaches the caller
    pub async fn load(source: Arc<dyn ContentSource>) -> ApiResult<Arc<Self>> {
        let cache = Self::empty(source, &CONTENT_KEYS);
        cache.refresh().await?;
        Ok(cache)
    }

    fn empty(source: Arc<dyn ContentSource>, keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            source,
            keys: keys.iter().map(|k| k.to_string()).collect(),
            applied: RwLock::new(Applied {
                seq: 0,
                snapshot: Arc::new(ContentSnapshot::empty_for(keys)),
            }),
            next_seq: AtomicU64::new(1),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(0),
        })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<ContentSnapshot> {
        self.current().1
    }

    fn current(&self) -> (u64, Arc<ContentSnapshot>) {
        let applied = self
            .applied
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (applied.seq, Arc::clone(&applied.snapshot))
    }

    /// Watch the content
    ///
    /// `listener` runs right away with the current snapshot and again after
    /// every successful refresh, until the returned handle is unsubscribed.
    /// A listener never sees a snapshot older than one it has already seen.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(Arc<ContentSnapshot>) + Send + Sync + 'static,
    {
        let listener = Arc::new(Listener::new(Box::new(listener)));
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners().insert(id, Arc::clone(&listener));

        let (seq, snapshot) = self.current();
        listener.deliver(seq, snapshot);

        Subscription {
            id,
            cache: Arc::downgrade(self),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    /// Fetch the key set again and swap in the result as a whole
    ///
    /// On failure the previous snapshot stays and listeners are not called.
    /// A fetch that completes after a later-started refresh was applied is
    /// dropped.
    pub async fn refresh(&self) -> ApiResult<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        let values = self.source.fetch_content(&keys).await?;
        let snapshot = Arc::new(ContentSnapshot::from(values));

        {
            let mut applied = self
                .applied
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if seq <= applied.seq {
                tracing::debug!(
                    "Dropping content refresh #{}, #{} is already applied",
                    seq,
                    applied.seq
                );
                return Ok(());
            }
            *applied = Applied {
                seq,
                snapshot: Arc::clone(&snapshot),
            };
        }
        tracing::debug!("Content refreshed ({} fragments)", snapshot.len());

        // Listeners run outside the cache locks so they may subscribe or read freely
        let listeners: Vec<Arc<Listener>> = self.listeners().values().cloned().collect();
        for listener in listeners {
            listener.deliver(seq, Arc::clone(&snapshot));
        }
        Ok(())
    }

    fn listeners(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Listener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle returned by [`ContentCache::subscribe`]
///
/// Dropping the handle leaves the listener registered.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    cache: Weak<ContentCache>,
}

impl Subscription {
    /// Stop delivering snapshots to this listener
    pub fn unsubscribe(self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.listeners().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::storage::MemoryStore;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Hands out queued results, then an error once the queue is empty
    #[derive(Default)]
    struct ScriptedSource {
        results: Mutex<VecDeque<ApiResult<BTreeMap<String, String>>>>,
        requested: Mutex<Vec<Vec<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn push_ok(&self, pairs: &[(&str, &str)]) {
            let map = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.results.lock().unwrap().push_back(Ok(map));
        }

        fn push_err(&self, status: StatusCode) {
            self.results
                .lock()
                .unwrap()
                .push_back(Err(ApiError::RequestFailed(status)));
        }
    }

    #[async_trait]
    impl ContentSource for ScriptedSource {
        async fn fetch_content(&self, ids: &[&str]) -> ApiResult<BTreeMap<String, String>> {
            self.requested
                .lock()
                .unwrap()
                .push(ids.iter().map(|id| id.to_string()).collect());
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::RequestFailed(StatusCode::SERVICE_UNAVAILABLE)))
        }
    }

    async fn wait_for_calls(source: &ScriptedSource, n: usize) {
        while source.calls.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    fn full_content(title: &str) -> Vec<(&'static str, String)> {
        vec![
            ("site-title", title.to_string()),
            ("site-home-logged-out", "Sign in to see your things".to_string()),
            ("site-home-empty", "Nothing here yet".to_string()),
            ("site-home-normal", "Your things".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_starts_empty_and_refreshes_once_in_background() {
        let source = Arc::new(ScriptedSource::default());
        let content = full_content("Thingbox");
        let pairs: Vec<(&str, &str)> = content.iter().map(|(k, v)| (*k, v.as_str())).collect();
        source.push_ok(&pairs);

        let cache = ContentCache::new(source.clone());
        assert_eq!(*cache.snapshot(), ContentSnapshot::empty_for(&CONTENT_KEYS));
        assert_eq!(cache.keys(), CONTENT_KEYS.map(String::from).as_slice());

        wait_for_calls(&source, 1).await;
        assert_eq!(cache.snapshot().get("site-title"), Some("Thingbox"));
        assert_eq!(
            source.requested.lock().unwrap()[0],
            CONTENT_KEYS.iter().map(|k| k.to_string()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_initial_failure_is_swallowed() {
        let source = Arc::new(ScriptedSource::default());
        source.push_err(StatusCode::INTERNAL_SERVER_ERROR);

        let cache = ContentCache::new(source.clone());
        wait_for_calls(&source, 1).await;
        tokio::task::yield_now().await;

        assert_eq!(*cache.snapshot(), ContentSnapshot::empty_for(&CONTENT_KEYS));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot_wholesale() {
        let source = Arc::new(ScriptedSource::default());
        source.push_ok(&[("a", "1"), ("b", "2")]);
        source.push_ok(&[("a", "10")]);

        let cache = ContentCache::with_keys(source.clone(), &["a", "b"]);
        wait_for_calls(&source, 1).await;
        assert_eq!(cache.snapshot().len(), 2);

        cache.refresh().await.unwrap();
        let snapshot = cache.snapshot();
        let expected: BTreeMap<String, String> =
            [("a".to_string(), "10".to_string())].into_iter().collect();
        assert_eq!(snapshot.as_map(), &expected);
        assert_eq!(snapshot.get("b"), None);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let source = Arc::new(ScriptedSource::default());
        source.push_ok(&[("a", "1")]);
        source.push_err(StatusCode::BAD_GATEWAY);

        let cache = ContentCache::with_keys(source.clone(), &["a"]);
        wait_for_calls(&source, 1).await;

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let _subscription = cache.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        let err = cache.refresh().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(cache.snapshot().get("a"), Some("1"));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribers_are_independent() {
        let source = Arc::new(ScriptedSource::default());
        source.push_err(StatusCode::SERVICE_UNAVAILABLE);
        source.push_ok(&[("a", "first")]);
        source.push_ok(&[("a", "second")]);

        let cache = ContentCache::with_keys(source.clone(), &["a"]);
        wait_for_calls(&source, 1).await;

        let seen_one = Arc::new(Mutex::new(Vec::new()));
        let seen_two = Arc::new(Mutex::new(Vec::new()));
        let log_one = seen_one.clone();
        let log_two = seen_two.clone();
        let one = cache.subscribe(move |s| {
            log_one.lock().unwrap().push(s.get("a").unwrap_or_default().to_string())
        });
        let _two = cache.subscribe(move |s| {
            log_two.lock().unwrap().push(s.get("a").unwrap_or_default().to_string())
        });
        assert_eq!(cache.listener_count(), 2);

        cache.refresh().await.unwrap();
        one.unsubscribe();
        assert_eq!(cache.listener_count(), 1);
        cache.refresh().await.unwrap();

        assert_eq!(*seen_one.lock().unwrap(), vec!["", "first"]);
        assert_eq!(*seen_two.lock().unwrap(), vec!["", "first", "second"]);
    }

    /// First fetch waits for `release`; later ones answer immediately
    #[derive(Default)]
    struct SlowFirstSource {
        release: Notify,
        calls: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for SlowFirstSource {
        async fn fetch_content(&self, _ids: &[&str]) -> ApiResult<BTreeMap<String, String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.release.notified().await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok([("a".to_string(), format!("v{}", call))].into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_late_initial_refresh_does_not_overwrite_newer_content() {
        let source = Arc::new(SlowFirstSource::default());
        let cache = ContentCache::with_keys(source.clone(), &["a"]);
        while source.calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        cache.refresh().await.unwrap();
        assert_eq!(cache.snapshot().get("a"), Some("v1"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _subscription = cache.subscribe(move |s| {
            log.lock().unwrap().push(s.get("a").unwrap_or_default().to_string())
        });

        source.release.notify_one();
        while source.finished.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        assert_eq!(cache.snapshot().get("a"), Some("v1"));
        assert_eq!(*seen.lock().unwrap(), vec!["v1"]);
    }

    #[test]
    fn test_listener_never_goes_backwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let listener = Listener::new(Box::new(move |s: Arc<ContentSnapshot>| {
            log.lock().unwrap().push(s.get("a").unwrap_or_default().to_string())
        }));
        let snapshot = |v: &str| {
            Arc::new(ContentSnapshot::from(
                [("a".to_string(), v.to_string())].into_iter().collect::<BTreeMap<_, _>>(),
            ))
        };

        listener.deliver(2, snapshot("new"));
        listener.deliver(0, snapshot("initial"));
        listener.deliver(2, snapshot("again"));
        listener.deliver(3, snapshot("newest"));

        assert_eq!(*seen.lock().unwrap(), vec!["new", "newest"]);
    }

    #[tokio::test]
    async fn test_load_fetches_exactly_once() {
        let source = Arc::new(ScriptedSource::default());
        source.push_ok(&[("site-title", "Thingbox")]);

        let cache = ContentCache::load(source.clone()).await.unwrap();
        assert_eq!(cache.snapshot().get("site-title"), Some("Thingbox"));

        tokio::task::yield_now().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_reports_failure() {
        let source = Arc::new(ScriptedSource::default());
        source.push_err(StatusCode::INTERNAL_SERVER_ERROR);

        let err = ContentCache::load(source).await.err().unwrap();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_cache_over_api_client() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/content")
            .match_query(mockito::Matcher::Exact(
                "id=site-title&id=site-home-logged-out&id=site-home-empty&id=site-home-normal"
                    .to_string(),
            ))
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body(
                r#"{"site-title": "Thingbox", "site-home-logged-out": "Hello",
                    "site-home-empty": "Empty", "site-home-normal": "Welcome back"}"#,
            )
            .expect_at_least(1)
            .create_async()
            .await;

        let client = ApiClient::new(server.url(), Arc::new(MemoryStore::new())).unwrap();
        let cache = ContentCache::new(Arc::new(client));
        cache.refresh().await.unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.get("site-title"), Some("Thingbox"));
        assert_eq!(snapshot.get("site-home-normal"), Some("Welcome back"));
        mock.assert_async().await;
    }
}
