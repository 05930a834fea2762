//! The subscriber registry.
//!
//! A [`Registry`] stores weak handles to subscribers in attach order and
//! delivers notifications to the ones that are still alive. It never owns a
//! subscriber: dropping the last strong reference elsewhere expires the entry,
//! and expired entries are reclaimed lazily by notify or by
//! [`Registry::cleanup_expired`].
//!
//! ## Locking
//! ```text
//! attach / detach / cleanup ──► write lock ──► linear scan ──► release
//! has_subscriber / len      ──► read lock  ──► linear scan ──► release
//! notify                    ──► write lock ──► resolve + sweep ──► release
//!                                                   │
//!                                                   └─► callbacks on the snapshot
//! ```
//! Callbacks never run under the lock, so a subscriber may re-enter the
//! registry from its `update`.
//!
//! Scans that run under the lock are always sequential. A rayon scan there
//! could wait on pool workers that are themselves blocked on the same lock
//! inside a callback. [`ExecutionPolicy::Parallel`] therefore applies to
//! delivery and to the read-only queries, which scan a copy of the handles
//! taken under the read lock.

/// Payload-specific notify entry points.
mod deliver;
/// Counters and per-pass reports.
mod stats;

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use log::{debug, trace};
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::config::{RegistryConfig, SweepPolicy};
use crate::container::{self, ExecutionPolicy};
use crate::error::WeakPubResult;
use crate::handle::{RegistryId, SubscriberHandle, SubscriberToken};
use crate::subscriber::Subscription;

pub use stats::{NotifyReport, RegistryStats};
pub(crate) use stats::StatsCounters;

/// Policy for every scan performed while the entry lock is held.
const LOCKED_SCAN: ExecutionPolicy = ExecutionPolicy::Sequential;

struct Entry<S: ?Sized> {
    token: SubscriberToken,
    handle: SubscriberHandle<S>,
    attached_at: DateTime<Utc>,
}

impl<S: ?Sized> Entry<S> {
    fn new(handle: SubscriberHandle<S>) -> Self {
        Self {
            token: SubscriberToken::new(),
            handle,
            attached_at: Utc::now(),
        }
    }
}

/// Deduplicated collection of weak subscriber handles.
///
/// Share it between threads with `Arc<Registry<S>>`; every operation takes
/// `&self`.
pub struct Registry<S: ?Sized> {
    id: RegistryId,
    config: RegistryConfig,
    entries: RwLock<Vec<Entry<S>>>,
    stats: StatsCounters,
}

impl<S: ?Sized + Send + Sync> Registry<S> {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(RegistryConfig::default())
    }

    /// Creates a registry after validating `config`.
    pub fn with_config(config: RegistryConfig) -> WeakPubResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config))
    }

    fn from_parts(config: RegistryConfig) -> Self {
        Self {
            id: RegistryId::new(),
            config,
            entries: RwLock::new(Vec::new()),
            stats: StatsCounters::default(),
        }
    }

    /// Registry id.
    #[must_use]
    pub const fn id(&self) -> RegistryId {
        self.id
    }

    /// Configured name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn label(&self) -> String {
        match &self.config.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// Attaches a subscriber.
    ///
    /// An expired handle is ignored and yields `None`. A handle whose
    /// subscriber is already attached is not inserted again; the existing
    /// entry's token is returned. The return value may be ignored, and
    /// [`Self::has_subscriber`] answers whether the subscriber is present.
    pub fn attach(&self, handle: &SubscriberHandle<S>) -> Option<SubscriberToken> {
        // Keep the subscriber alive across the scan so the liveness check holds.
        let Some(_alive) = handle.try_resolve() else {
            trace!("registry {}: ignoring attach of expired handle", self.label());
            return None;
        };
        Some(self.attach_live(handle))
    }

    /// Inserts a handle whose subscriber the caller keeps alive.
    pub(crate) fn attach_live(&self, handle: &SubscriberHandle<S>) -> SubscriberToken {
        let mut entries = self.entries.write();
        let placed = container::emplace_unique(
            LOCKED_SCAN,
            &mut *entries,
            Entry::new(handle.clone()),
            |existing, new| existing.handle == new.handle,
        );
        let token = entries[placed.index()].token;
        let total = entries.len();
        drop(entries);

        if placed.inserted() {
            debug!("registry {}: attached {token} ({total} entries)", self.label());
        } else {
            trace!("registry {}: duplicate attach suppressed for {token}", self.label());
        }
        token
    }

    /// Attaches an owned subscriber and returns the subscription that keeps it
    /// alive.
    pub fn subscribe(self: &Arc<Self>, subscriber: Arc<S>) -> Subscription<S> {
        let handle = SubscriberHandle::new(&subscriber);
        let token = self.attach_live(&handle);
        Subscription::new(subscriber, token, Arc::downgrade(self))
    }

    /// Detaches a subscriber.
    ///
    /// Absent or expired handles are a no-op. Returns true if an entry was
    /// removed.
    pub fn detach(&self, handle: &SubscriberHandle<S>) -> bool {
        if handle.is_expired() {
            trace!("registry {}: ignoring detach of expired handle", self.label());
            return false;
        }
        self.remove_where(|entry| entry.handle.same_referent(handle))
    }

    /// Detaches the entry issued `token`, whether or not its subscriber is
    /// alive. Returns true if an entry was removed.
    pub fn detach_token(&self, token: SubscriberToken) -> bool {
        self.remove_where(|entry| entry.token == token)
    }

    fn remove_where<P>(&self, pred: P) -> bool
    where
        P: Fn(&Entry<S>) -> bool + Sync + Send,
    {
        let mut entries = self.entries.write();
        let Some(index) = container::find_index(LOCKED_SCAN, entries.as_slice(), pred) else {
            return false;
        };
        let removed = entries.remove(index);
        let total = entries.len();
        drop(entries);

        debug!(
            "registry {}: detached {} after {}ms ({total} entries)",
            self.label(),
            removed.token,
            (Utc::now() - removed.attached_at).num_milliseconds()
        );
        true
    }

    /// True if a live handle to the same subscriber is attached.
    ///
    /// Sweeps expired entries first when `cleanup_on_query` is configured.
    #[must_use]
    pub fn has_subscriber(&self, handle: &SubscriberHandle<S>) -> bool {
        if self.config.cleanup_on_query {
            self.cleanup_expired();
        }
        if handle.is_expired() {
            return false;
        }
        let handles = self.handles();
        container::find_index(self.config.execution, handles.as_slice(), |attached| attached == handle).is_some()
    }

    /// True if the entry issued `token` is still stored.
    #[must_use]
    pub fn contains_token(&self, token: SubscriberToken) -> bool {
        self.entries.read().iter().any(|entry| entry.token == token)
    }

    /// Removes every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = container::erase_if(LOCKED_SCAN, &mut *entries, |entry| entry.handle.is_expired());
        drop(entries);

        self.stats.record_reclaimed(removed);
        if removed > 0 {
            debug!("registry {}: reclaimed {removed} expired entries", self.label());
        }
        removed
    }

    /// Invokes `deliver` once for every live subscriber.
    ///
    /// Under the write lock each handle is resolved to a strong reference and
    /// expired entries are counted and swept per the configured
    /// [`SweepPolicy`]. The lock is then released and `deliver` runs over the
    /// resolved subscribers, in attach order for
    /// [`ExecutionPolicy::Sequential`] or on the rayon pool for
    /// [`ExecutionPolicy::Parallel`].
    pub fn notify_each<F>(&self, deliver: F) -> NotifyReport
    where
        F: Fn(&S) + Sync + Send,
    {
        let started_at = Utc::now();
        let (snapshot, expired, reclaimed) = {
            let mut entries = self.entries.write();
            let mut live: Vec<Arc<S>> = Vec::with_capacity(entries.len());
            let mut expired = 0usize;
            for entry in entries.iter() {
                match entry.handle.try_resolve() {
                    Some(subscriber) => live.push(subscriber),
                    None => expired += 1,
                }
            }

            let reclaimed = if expired == 0 {
                0
            } else {
                match self.config.sweep {
                    SweepPolicy::Bounded => {
                        container::erase_first_n_if(&mut *entries, expired, |entry| entry.handle.is_expired())
                    }
                    SweepPolicy::Full => {
                        container::erase_if(LOCKED_SCAN, &mut *entries, |entry| entry.handle.is_expired())
                    }
                    SweepPolicy::Deferred => 0,
                }
            };
            (live, expired, reclaimed)
        };

        match self.config.execution {
            ExecutionPolicy::Sequential => snapshot.iter().for_each(|subscriber| deliver(&**subscriber)),
            ExecutionPolicy::Parallel => snapshot.par_iter().for_each(|subscriber| deliver(&**subscriber)),
        }

        let report = NotifyReport {
            delivered: snapshot.len(),
            expired,
            reclaimed,
        };
        // Subscribers whose last owner went away mid-pass are dropped here,
        // after the lock is released.
        drop(snapshot);

        self.stats.record_notify(started_at, &report);
        trace!(
            "registry {}: notified {} subscribers ({} expired, {} reclaimed)",
            self.label(),
            report.delivered,
            report.expired,
            report.reclaimed
        );
        report
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of entries whose subscriber is alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        let handles = self.handles();
        container::count_if(self.config.execution, handles.as_slice(), |attached| !attached.is_expired())
    }

    /// Copies the stored handles out from under the read lock.
    fn handles(&self) -> Vec<SubscriberHandle<S>> {
        self.entries.read().iter().map(|entry| entry.handle.clone()).collect()
    }

    /// Tokens of all stored entries, in attach order.
    #[must_use]
    pub fn tokens(&self) -> Vec<SubscriberToken> {
        self.entries.read().iter().map(|entry| entry.token).collect()
    }

    /// Removes every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.entries.write());
        if !removed.is_empty() {
            debug!("registry {}: cleared {} entries", self.label(), removed.len());
        }
        removed.len()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        let live = entries.iter().filter(|entry| !entry.handle.is_expired()).count();
        let total = entries.len();
        drop(entries);
        self.stats.snapshot(total, live)
    }

    /// A weak reference to this registry, for holders that must not keep it
    /// alive.
    #[must_use]
    pub fn downgrade(self: &Arc<Self>) -> Weak<Self> {
        Arc::downgrade(self)
    }
}

impl<S: ?Sized + Send + Sync> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::subscriber::Subscriber;

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl Counter {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Subscriber for Counter {
        fn update(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> (Arc<Counter>, SubscriberHandle<dyn Subscriber>) {
        let strong = Arc::new(Counter::default());
        let weak = Arc::downgrade(&strong);
        let weak: Weak<dyn Subscriber> = weak;
        (strong, SubscriberHandle::from_weak(weak))
    }

    fn registry_with(sweep: SweepPolicy) -> Registry<dyn Subscriber> {
        Registry::with_config(RegistryConfig::builder().sweep(sweep).build().unwrap()).unwrap()
    }

    #[test]
    fn test_attach_deduplicates() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (_s1, h1) = counter();

        let first = registry.attach(&h1);
        let second = registry.attach(&h1.clone());
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_attach_expired_is_noop() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (s1, h1) = counter();
        drop(s1);

        assert!(registry.attach(&h1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_detach_is_idempotent() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (_s1, h1) = counter();
        let (_s2, h2) = counter();
        registry.attach(&h1);
        registry.attach(&h2);

        assert!(registry.detach(&h1));
        let after_first = registry.tokens();
        assert!(!registry.detach(&h1));
        assert_eq!(registry.tokens(), after_first);
        assert!(!registry.has_subscriber(&h1));
        assert!(registry.has_subscriber(&h2));
    }

    #[test]
    fn test_detach_expired_handle_is_noop() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (s1, h1) = counter();
        registry.attach(&h1);
        drop(s1);

        assert!(!registry.detach(&h1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.cleanup_expired(), 1);
    }

    #[test]
    fn test_detach_token_removes_expired_entry() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (s1, h1) = counter();
        let token = registry.attach(&h1).unwrap();
        drop(s1);

        assert!(registry.detach_token(token));
        assert!(!registry.detach_token(token));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notify_skips_and_reclaims_expired() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (s1, h1) = counter();
        let (s2, h2) = counter();
        let (s3, h3) = counter();
        registry.attach(&h1);
        registry.attach(&h2);
        registry.attach(&h3);

        let report = registry.notify();
        assert_eq!(report.delivered, 3);
        assert_eq!((s1.hits(), s2.hits(), s3.hits()), (1, 1, 1));

        drop(s2);
        let report = registry.notify();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.expired, 1);
        assert_eq!(report.reclaimed, 1);
        assert_eq!((s1.hits(), s3.hits()), (2, 2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bounded_sweep_reclaims_counted_entries() {
        let registry = registry_with(SweepPolicy::Bounded);
        let (s1, h1) = counter();
        let (s2, h2) = counter();
        let (_s3, h3) = counter();
        registry.attach(&h1);
        registry.attach(&h2);
        registry.attach(&h3);
        drop(s1);
        drop(s2);

        let report = registry.notify();
        assert_eq!(report.expired, 2);
        assert_eq!(report.reclaimed, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deferred_sweep_waits_for_cleanup() {
        let registry = registry_with(SweepPolicy::Deferred);
        let (s1, h1) = counter();
        let (s2, h2) = counter();
        registry.attach(&h1);
        registry.attach(&h2);
        drop(s1);

        let report = registry.notify();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.reclaimed, 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(s2.hits(), 1);

        assert_eq!(registry.cleanup_expired(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_has_subscriber_with_cleanup_on_query() {
        let config = RegistryConfig::builder().cleanup_on_query(true).build().unwrap();
        let registry: Registry<dyn Subscriber> = Registry::with_config(config).unwrap();
        let (s1, h1) = counter();
        let (_s2, h2) = counter();
        registry.attach(&h1);
        registry.attach(&h2);
        drop(s1);

        assert!(registry.has_subscriber(&h2));
        assert!(!registry.has_subscriber(&h1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reattach_after_detach_delivers_once() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (s1, h1) = counter();
        registry.attach(&h1);
        registry.detach(&h1);
        registry.attach(&h1);

        registry.notify();
        assert_eq!(s1.hits(), 1);
    }

    #[test]
    fn test_parallel_delivery_reaches_everyone_once() {
        let config = RegistryConfig::builder().execution(ExecutionPolicy::Parallel).build().unwrap();
        let registry: Registry<dyn Subscriber> = Registry::with_config(config).unwrap();
        let subscribers: Vec<_> = (0..64).map(|_| counter()).collect();
        for (_, handle) in &subscribers {
            registry.attach(handle);
            registry.attach(handle);
        }
        assert_eq!(registry.len(), 64);

        let report = registry.notify();
        assert_eq!(report.delivered, 64);
        assert!(subscribers.iter().all(|(strong, _)| strong.hits() == 1));
    }

    #[test]
    fn test_clear_and_stats() {
        let registry: Registry<dyn Subscriber> = Registry::new();
        let (_s1, h1) = counter();
        let (s2, h2) = counter();
        registry.attach(&h1);
        registry.attach(&h2);
        drop(s2);

        let stats = registry.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.notifications, 0);
        assert!(stats.last_notified_at.is_none());

        registry.notify();
        let stats = registry.stats();
        assert_eq!(stats.notifications, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.reclaimed, 1);
        assert!(stats.last_notified_at.is_some());

        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let config = RegistryConfig {
            notifier_capacity: 0,
            ..RegistryConfig::default()
        };
        let err = Registry::<dyn Subscriber>::with_config(config).unwrap_err();
        assert!(err.is_validation());
    }
}
