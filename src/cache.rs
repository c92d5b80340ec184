//! Cached list of entity-model names known to the platform, used by model suggest.
//!
//! A refill first asks for the total row count of `EDF_EntityModel`. When it matches
//! the count remembered from the last successful refill and the cache is non-empty,
//! nothing is fetched. Otherwise all pages are fetched concurrently and the cache is
//! replaced with the deduplicated names. Only one refill runs at a time, on its own
//! task; callers arriving meanwhile wait for its outcome.

use crate::edf::{EdfClient, SearchRequest};
use crate::error::AppError;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;

pub const MODEL_ENTITY: &str = "EDF_EntityModel";
pub const MODEL_PAGE_SIZE: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Row count unchanged; cached names kept.
    Fresh,
    /// Cache replaced with `count` distinct names.
    Refilled { count: usize },
    /// The refill task ended without reporting (the runtime shut it down).
    AlreadyRunning,
}

type Shared = Option<Result<RefillOutcome, String>>;

enum Phase {
    Idle,
    Refilling(watch::Receiver<Shared>),
}

#[derive(Default)]
struct Snapshot {
    names: Vec<String>,
    total: Option<u64>,
}

struct Inner {
    data: RwLock<Snapshot>,
    phase: Mutex<Phase>,
    page_size: u64,
}

/// Cheap to clone; clones share the same names and refill state.
#[derive(Clone)]
pub struct ModelNameCache {
    inner: Arc<Inner>,
}

impl Default for ModelNameCache {
    fn default() -> Self {
        ModelNameCache::new()
    }
}

/// Resets the phase to idle even if the refill task panics.
struct IdleOnDrop<'a>(&'a Mutex<Phase>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Phase::Idle;
    }
}

impl ModelNameCache {
    pub fn new() -> Self {
        ModelNameCache::with_page_size(MODEL_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: u64) -> Self {
        ModelNameCache {
            inner: Arc::new(Inner {
                data: RwLock::new(Snapshot::default()),
                phase: Mutex::new(Phase::Idle),
                page_size: page_size.max(1),
            }),
        }
    }

    /// Current names, in first-seen order.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.data.read().unwrap_or_else(|p| p.into_inner()).names.clone()
    }

    /// Row count remembered from the last successful refill.
    pub fn fingerprint(&self) -> Option<u64> {
        self.inner.data.read().unwrap_or_else(|p| p.into_inner()).total
    }

    pub fn is_refilling(&self) -> bool {
        matches!(*self.inner.phase.lock().unwrap_or_else(|p| p.into_inner()), Phase::Refilling(_))
    }

    /// Bring the cache up to date. On failure the previous names stay in place.
    ///
    /// The refill runs on its own task, so dropping the caller that started it
    /// does not abort the page fetches other callers are waiting on.
    pub async fn refill(&self, client: &Arc<EdfClient>) -> Result<RefillOutcome, AppError> {
        let mut rx = {
            let mut phase = self.inner.phase.lock().unwrap_or_else(|p| p.into_inner());
            match &*phase {
                Phase::Refilling(rx) => {
                    tracing::info!("model name refill already in progress, waiting");
                    rx.clone()
                }
                Phase::Idle => {
                    let (tx, rx) = watch::channel(None);
                    *phase = Phase::Refilling(rx.clone());
                    let inner = Arc::clone(&self.inner);
                    let client = Arc::clone(client);
                    tokio::spawn(async move {
                        let idle = IdleOnDrop(&inner.phase);
                        let result = inner.fill(&client).await;
                        match &result {
                            Ok(outcome) => tracing::info!(?outcome, "model name refill done"),
                            Err(e) => tracing::error!(error = %e, "model name refill failed, keeping previous names"),
                        }
                        drop(idle);
                        tx.send_replace(Some(result.map_err(|e| e.to_string())));
                    });
                    rx
                }
            }
        };

        let shared = match rx.wait_for(Option::is_some).await {
            Ok(v) => v.clone(),
            Err(_) => return Ok(RefillOutcome::AlreadyRunning),
        };
        match shared {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(AppError::Upstream { status: None, message }),
            None => Ok(RefillOutcome::AlreadyRunning),
        }
    }
}

impl Inner {
    async fn fill(&self, client: &EdfClient) -> Result<RefillOutcome, AppError> {
        let first_page = client
            .search_page(None, &SearchRequest::new(MODEL_ENTITY, "").page(1, 1))
            .await?;
        let total = first_page.paging.total_rows.unwrap_or(0);
        {
            let data = self.data.read().unwrap_or_else(|p| p.into_inner());
            if data.total == Some(total) && !data.names.is_empty() {
                tracing::info!(total, "entity models unchanged");
                return Ok(RefillOutcome::Fresh);
            }
        }

        let page_size = self.page_size;
        let pages = total.div_ceil(page_size);
        tracing::info!(total, pages, "refilling entity model names");
        let fetches = (1..=pages).map(|page| async move {
            let request = SearchRequest::new(MODEL_ENTITY, "").page(page, page_size);
            client.search_page(None, &request).await
        });
        let results = try_join_all(fetches).await?;

        let mut seen = HashSet::new();
        let names: Vec<String> = results
            .iter()
            .flat_map(|page| page.rows.iter())
            .filter_map(model_name)
            .filter(|name| seen.insert(name.clone()))
            .collect();
        let count = names.len();

        let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
        data.names = names;
        data.total = Some(total);
        Ok(RefillOutcome::Refilled { count })
    }
}

fn model_name(row: &Value) -> Option<String> {
    row.pointer("/object/name").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceAccount;
    use crate::edf::testing::{http_status, success, FakeTransport};
    use crate::edf::{OutboundCall, TransportError};
    use crate::session::Session;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn page_of(call: &OutboundCall) -> (u64, u64) {
        let paging = &call.body["paging"];
        (
            paging["pageNumber"].as_u64().unwrap(),
            paging["pageSize"].as_u64().unwrap(),
        )
    }

    /// Platform answer for `total` models named `M<i>`; every page also repeats `Shared`.
    fn platform_response(total: u64, call: &OutboundCall) -> Result<Value, TransportError> {
        let (page, size) = page_of(call);
        if size == 1 {
            return Ok(success(json!({"rows": [], "paging": {"totalRows": total}})));
        }
        let start = (page - 1) * size;
        let end = (start + size).min(total);
        let mut rows: Vec<Value> = (start..end).map(|i| json!({"object": {"name": format!("M{}", i)}})).collect();
        rows.push(json!({"object": {"name": "Shared"}}));
        rows.push(json!({"object": {}}));
        Ok(success(json!({"rows": rows, "paging": {"totalRows": total}})))
    }

    fn platform(total: Arc<AtomicU64>) -> FakeTransport {
        FakeTransport::new(move |call| platform_response(total.load(Ordering::SeqCst), call))
    }

    fn client(fake: Arc<FakeTransport>) -> Arc<EdfClient> {
        Arc::new(EdfClient::new(
            "http://edf",
            fake,
            Arc::new(Session::with_token("Bearer t")),
            ServiceAccount {
                client_id: "admin".into(),
                client_secret: "pw".into(),
            },
        ))
    }

    fn page_fetches(fake: &FakeTransport) -> usize {
        fake.calls().iter().filter(|c| page_of(c).1 == MODEL_PAGE_SIZE).count()
    }

    #[tokio::test]
    async fn fetches_ceil_total_over_page_size_pages() {
        let fake = platform(Arc::new(AtomicU64::new(250))).into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        let outcome = cache.refill(&c).await.unwrap();
        assert_eq!(outcome, RefillOutcome::Refilled { count: 251 });
        assert_eq!(page_fetches(&fake), 3);
        let names = cache.snapshot();
        assert_eq!(names.len(), 251);
        assert_eq!(names.iter().filter(|n| *n == "Shared").count(), 1);
        assert!(names.contains(&"M249".to_string()));
        assert_eq!(cache.fingerprint(), Some(250));
    }

    #[tokio::test]
    async fn unchanged_total_skips_fan_out() {
        let fake = platform(Arc::new(AtomicU64::new(150))).into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        cache.refill(&c).await.unwrap();
        let before = cache.snapshot();
        assert_eq!(cache.refill(&c).await.unwrap(), RefillOutcome::Fresh);
        assert_eq!(page_fetches(&fake), 2);
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn changed_total_triggers_refill() {
        let total = Arc::new(AtomicU64::new(100));
        let fake = platform(total.clone()).into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        cache.refill(&c).await.unwrap();
        total.store(101, Ordering::SeqCst);
        assert_eq!(cache.refill(&c).await.unwrap(), RefillOutcome::Refilled { count: 102 });
        assert_eq!(page_fetches(&fake), 1 + 2);
    }

    #[tokio::test]
    async fn zero_total_gives_empty_cache_without_page_fetches() {
        let fake = platform(Arc::new(AtomicU64::new(0))).into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        assert_eq!(cache.refill(&c).await.unwrap(), RefillOutcome::Refilled { count: 0 });
        assert!(cache.snapshot().is_empty());
        assert_eq!(page_fetches(&fake), 0);
    }

    #[tokio::test]
    async fn concurrent_refills_share_one_fan_out() {
        let fake = platform(Arc::new(AtomicU64::new(250)))
            .with_delay(Duration::from_millis(20))
            .into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        let (a, b) = tokio::join!(cache.refill(&c), cache.refill(&c));
        assert_eq!(a.unwrap(), RefillOutcome::Refilled { count: 251 });
        assert_eq!(b.unwrap(), RefillOutcome::Refilled { count: 251 });
        assert_eq!(page_fetches(&fake), 3);
        assert!(!cache.is_refilling());
    }

    #[tokio::test]
    async fn dropped_starter_does_not_cancel_shared_refill() {
        let fake = platform(Arc::new(AtomicU64::new(250)))
            .with_delay(Duration::from_millis(50))
            .into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        let starter = tokio::time::timeout(Duration::from_millis(70), cache.refill(&c));
        let joiner = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.refill(&c).await
        };
        let (started, joined) = tokio::join!(starter, joiner);
        assert!(started.is_err(), "starter should have timed out");
        assert_eq!(joined.unwrap(), RefillOutcome::Refilled { count: 251 });
        assert_eq!(cache.snapshot().len(), 251);
        assert_eq!(page_fetches(&fake), 3);
        assert!(!cache.is_refilling());
    }

    #[tokio::test]
    async fn page_failure_keeps_previous_names_and_clears_flag() {
        let total = Arc::new(AtomicU64::new(100));
        let fail = Arc::new(AtomicU64::new(0));
        let (total_in, fail_flag) = (total.clone(), fail.clone());
        let fake = FakeTransport::new(move |call| {
            let (page, size) = page_of(call);
            if fail_flag.load(Ordering::SeqCst) == 1 && size == MODEL_PAGE_SIZE && page == 2 {
                return Err(http_status(500));
            }
            platform_response(total_in.load(Ordering::SeqCst), call)
        })
        .into_arc();
        let c = client(fake.clone());
        let cache = ModelNameCache::new();

        cache.refill(&c).await.unwrap();
        let before = cache.snapshot();

        total.store(250, Ordering::SeqCst);
        fail.store(1, Ordering::SeqCst);
        assert!(cache.refill(&c).await.is_err());
        assert_eq!(cache.snapshot(), before);
        assert_eq!(cache.fingerprint(), Some(100));
        assert!(!cache.is_refilling());

        fail.store(0, Ordering::SeqCst);
        assert_eq!(cache.refill(&c).await.unwrap(), RefillOutcome::Refilled { count: 251 });
    }
}
