//! Service stub cache
//!
//! Keeps one initialized stub per [`ServiceName`] for a bounded time. Entries
//! expire after a TTL (default 10 minutes) or when capacity is exceeded; an
//! evicted stub is closed once every in-flight call holding it has finished.
//!
//! # Leases
//!
//! [`ServiceCache::get`] hands out a [`StubLease`] rather than the stub itself.
//! While any lease is alive the stub stays open, and a stub that has started
//! closing never hands out new leases: the lookup creates a fresh stub instead.

use super::errors::{AdsError, AdsResult};
use super::services::{ServiceName, ServiceStub, StubFactory, TransportOptions};
use futures::FutureExt;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, OnceCell};

/// Default TTL for cached stubs (10 minutes)
pub const DEFAULT_SERVICE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default maximum number of cached stubs
pub const DEFAULT_SERVICE_CACHE_MAX_CAPACITY: u64 = 1000;

/// How many times `get` retries when it races a closing stub
const MAX_LEASE_ATTEMPTS: usize = 3;

/// Service cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCacheConfig {
    /// Time-to-live for cached stubs
    pub ttl: Duration,
    /// Maximum number of cached stubs
    pub max_capacity: u64,
}

impl Default for ServiceCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SERVICE_CACHE_TTL,
            max_capacity: DEFAULT_SERVICE_CACHE_MAX_CAPACITY,
        }
    }
}

impl ServiceCacheConfig {
    /// Config with a custom TTL (useful for testing)
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }
}

/// A cached stub plus the bookkeeping needed to close it safely
struct StubHandle {
    service: ServiceName,
    stub: Arc<dyn ServiceStub>,
    in_flight: AtomicUsize,
    closing: AtomicBool,
    closed: OnceCell<()>,
    idle: Notify,
}

impl StubHandle {
    fn new(service: ServiceName, stub: Arc<dyn ServiceStub>) -> Self {
        Self {
            service,
            stub,
            in_flight: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            closed: OnceCell::new(),
            idle: Notify::new(),
        }
    }

    /// Take a lease, unless the stub has started closing
    fn lease(self: &Arc<Self>) -> Option<StubLease> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.closing.load(Ordering::SeqCst) {
            self.release();
            return None;
        }
        Some(StubLease {
            handle: Arc::clone(self),
        })
    }

    fn release(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Close the stub once no lease is outstanding. Runs the close at most once;
    /// concurrent callers all wait for the same close.
    async fn close_when_idle(self: Arc<Self>) {
        self.closing.store(true, Ordering::SeqCst);
        self.closed
            .get_or_init(|| async {
                loop {
                    let notified = self.idle.notified();
                    if self.in_flight.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    notified.await;
                }
                self.stub.close().await;
                tracing::debug!("Closed {} stub", self.service);
            })
            .await;
    }
}

/// Borrowed access to a cached stub
pub struct StubLease {
    handle: Arc<StubHandle>,
}

impl StubLease {
    pub fn service(&self) -> ServiceName {
        self.handle.service
    }
}

impl std::fmt::Debug for StubLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubLease")
            .field("service", &self.handle.service)
            .finish_non_exhaustive()
    }
}

impl Deref for StubLease {
    type Target = dyn ServiceStub;

    fn deref(&self) -> &Self::Target {
        self.handle.stub.as_ref()
    }
}

impl Drop for StubLease {
    fn drop(&mut self) {
        self.handle.release();
    }
}

/// TTL cache of service stubs, owned by a customer session
#[derive(Clone)]
pub struct ServiceCache {
    entries: Cache<ServiceName, Arc<StubHandle>>,
    factory: Arc<dyn StubFactory>,
    transport: Arc<TransportOptions>,
}

impl ServiceCache {
    pub fn new(
        factory: Arc<dyn StubFactory>,
        transport: TransportOptions,
        config: &ServiceCacheConfig,
    ) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .async_eviction_listener(
                |service: Arc<ServiceName>, handle: Arc<StubHandle>, cause: RemovalCause| {
                    async move {
                        tracing::info!("Evicting {} stub ({:?})", service, cause);
                        // Closing waits for outstanding leases; never block the cache on that
                        tokio::spawn(handle.close_when_idle());
                    }
                    .boxed()
                },
            )
            .build();

        Self {
            entries,
            factory,
            transport: Arc::new(transport),
        }
    }

    /// Lease the stub for `service`, creating it on a miss or after expiry
    pub async fn get(&self, service: ServiceName) -> AdsResult<StubLease> {
        for attempt in 0..MAX_LEASE_ATTEMPTS {
            let handle = self
                .entries
                .try_get_with(service, async {
                    let stub = self.factory.create(service, &self.transport)?;
                    tracing::info!("Created {} stub for {}", service, self.transport.endpoint);
                    Ok::<_, AdsError>(Arc::new(StubHandle::new(service, stub)))
                })
                .await
                .map_err(unshare)?;

            if let Some(lease) = handle.lease() {
                return Ok(lease);
            }

            tracing::debug!(
                "{} stub is closing, re-creating (attempt {})",
                service,
                attempt + 1
            );
            if let Some(current) = self.entries.get(&service).await {
                if Arc::ptr_eq(&current, &handle) {
                    self.entries.invalidate(&service).await;
                }
            }
        }

        Err(AdsError::Configuration(format!(
            "{} stub closed repeatedly while being leased",
            service
        )))
    }

    /// Evict and close every cached stub, waiting for the closes to finish
    pub async fn clear(&self) {
        let handles: Vec<Arc<StubHandle>> = self.entries.iter().map(|(_, handle)| handle).collect();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;

        for handle in handles {
            handle.close_when_idle().await;
        }
    }

    /// Run pending expirations and evictions now
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }

    /// Approximate number of cached stubs
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

/// Recover an owned error from moka's shared init error
fn unshare(err: Arc<AdsError>) -> AdsError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match shared.as_ref() {
        AdsError::UnknownService(name) => AdsError::UnknownService(name.clone()),
        other => AdsError::Configuration(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::services::{RpcRequest, RpcResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tonic::{Request, Status};

    struct CountingStub {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl ServiceStub for CountingStub {
        async fn unary(&self, _request: Request<RpcRequest>) -> Result<RpcResponse, Status> {
            Ok(RpcResponse::default())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: Mutex<Vec<Arc<CountingStub>>>,
    }

    impl CountingFactory {
        fn created(&self) -> Vec<Arc<CountingStub>> {
            self.created.lock().unwrap().clone()
        }
    }

    impl StubFactory for CountingFactory {
        fn create(
            &self,
            service: ServiceName,
            _transport: &TransportOptions,
        ) -> AdsResult<Arc<dyn ServiceStub>> {
            if service == ServiceName::RecommendationService {
                return Err(AdsError::UnknownService(service.to_string()));
            }
            let stub = Arc::new(CountingStub {
                closes: AtomicUsize::new(0),
            });
            self.created.lock().unwrap().push(Arc::clone(&stub));
            Ok(stub)
        }
    }

    fn cache_with_ttl(ttl: Duration) -> (ServiceCache, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let cache = ServiceCache::new(
            factory.clone(),
            TransportOptions::default(),
            &ServiceCacheConfig::with_ttl(ttl),
        );
        (cache, factory)
    }

    async fn wait_for_closes(stub: &CountingStub, expected: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while stub.closes.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "stub was not closed in time");
    }

    #[test]
    fn test_default_config() {
        let config = ServiceCacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.max_capacity, 1000);
    }

    #[tokio::test]
    async fn test_same_stub_within_ttl() {
        let (cache, factory) = cache_with_ttl(Duration::from_secs(60));

        let first = cache.get(ServiceName::CampaignService).await.unwrap();
        let second = cache.get(ServiceName::CampaignService).await.unwrap();

        assert!(Arc::ptr_eq(&first.handle, &second.handle));
        assert_eq!(first.service(), ServiceName::CampaignService);
        assert_eq!(factory.created().len(), 1);
    }

    #[tokio::test]
    async fn test_each_service_gets_its_own_stub() {
        let (cache, factory) = cache_with_ttl(Duration::from_secs(60));

        let a = cache.get(ServiceName::CampaignService).await.unwrap();
        let b = cache.get(ServiceName::AdGroupService).await.unwrap();

        assert!(!Arc::ptr_eq(&a.handle, &b.handle));
        assert_eq!(factory.created().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_stub_is_replaced_and_closed_once() {
        let (cache, factory) = cache_with_ttl(Duration::from_millis(100));

        let first = cache.get(ServiceName::GoogleAdsService).await.unwrap();
        let first_handle = Arc::clone(&first.handle);
        drop(first);

        tokio::time::sleep(Duration::from_millis(250)).await;

        let second = cache.get(ServiceName::GoogleAdsService).await.unwrap();
        cache.run_pending_tasks().await;

        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert!(!Arc::ptr_eq(&second.handle, &first_handle));

        wait_for_closes(&created[0], 1).await;
        cache.run_pending_tasks().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(created[0].closes.load(Ordering::SeqCst), 1);
        assert_eq!(created[1].closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_waits_for_outstanding_lease() {
        let (cache, factory) = cache_with_ttl(Duration::from_secs(60));

        let lease = cache.get(ServiceName::CustomerService).await.unwrap();
        let handle = Arc::clone(&lease.handle);
        let closing = tokio::spawn(Arc::clone(&handle).close_when_idle());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stub = &factory.created()[0];
        assert_eq!(stub.closes.load(Ordering::SeqCst), 0);
        // No new leases once closing has started
        assert!(handle.lease().is_none());

        drop(lease);
        closing.await.unwrap();
        assert_eq!(stub.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_after_close_recreates() {
        let (cache, factory) = cache_with_ttl(Duration::from_secs(60));

        let lease = cache.get(ServiceName::LabelService).await.unwrap();
        let handle = Arc::clone(&lease.handle);
        drop(lease);
        Arc::clone(&handle).close_when_idle().await;

        let fresh = cache.get(ServiceName::LabelService).await.unwrap();
        assert!(!Arc::ptr_eq(&fresh.handle, &handle));
        assert_eq!(factory.created().len(), 2);
    }

    #[tokio::test]
    async fn test_factory_error_is_not_cached() {
        let (cache, _factory) = cache_with_ttl(Duration::from_secs(60));

        for _ in 0..2 {
            let err = cache.get(ServiceName::RecommendationService).await.unwrap_err();
            assert!(matches!(err, AdsError::UnknownService(_)));
        }
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_stub() {
        let (cache, factory) = cache_with_ttl(Duration::from_secs(60));

        let leases = futures::future::join_all(
            (0..10).map(|_| cache.get(ServiceName::AssetService)),
        )
        .await;

        assert!(leases.iter().all(|l| l.is_ok()));
        assert_eq!(factory.created().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_closes_everything() {
        let (cache, factory) = cache_with_ttl(Duration::from_secs(60));

        drop(cache.get(ServiceName::CampaignService).await.unwrap());
        drop(cache.get(ServiceName::AdGroupService).await.unwrap());

        cache.clear().await;

        for stub in factory.created() {
            assert_eq!(stub.closes.load(Ordering::SeqCst), 1);
        }
        assert_eq!(cache.entry_count(), 0);
    }
}
