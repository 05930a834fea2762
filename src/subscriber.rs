//! Subscriber capabilities.
//!
//! Three payload shapes are supported, each with its own trait so a registry
//! is typed by the kind of notification it delivers:
//!
//! - [`Subscriber`]: no payload
//! - [`MessageSubscriber`]: a string message
//! - [`SourceSubscriber`]: a back-reference to the notifying registry
//!
//! Callbacks run after the registry has released its lock. They may be invoked
//! any number of times, in any order relative to other subscribers, and may
//! call back into the registry (attach, detach, query) without deadlocking.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::handle::{SubscriberHandle, SubscriberToken};
use crate::registry::Registry;

/// Receives payload-less notifications.
pub trait Subscriber: Send + Sync {
    /// Called once per notify pass while this subscriber is alive and attached.
    fn update(&self);
}

/// Receives a message with each notification.
pub trait MessageSubscriber: Send + Sync {
    /// Called once per notify pass with the published message.
    fn update(&self, message: &str);
}

/// Receives the notifying registry with each notification.
pub trait SourceSubscriber: Send + Sync {
    /// Called once per notify pass with the registry that is notifying.
    fn update(&self, source: &Registry<dyn SourceSubscriber>);
}

/// Adapts a closure to the subscriber traits.
pub struct FnSubscriber<F> {
    callback: F,
}

impl<F> FnSubscriber<F> {
    /// Wraps `callback`.
    #[must_use]
    pub const fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> fmt::Debug for FnSubscriber<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSubscriber").finish_non_exhaustive()
    }
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn() + Send + Sync,
{
    fn update(&self) {
        (self.callback)();
    }
}

impl<F> MessageSubscriber for FnSubscriber<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn update(&self, message: &str) {
        (self.callback)(message);
    }
}

impl<F> SourceSubscriber for FnSubscriber<F>
where
    F: Fn(&Registry<dyn SourceSubscriber>) + Send + Sync,
{
    fn update(&self, source: &Registry<dyn SourceSubscriber>) {
        (self.callback)(source);
    }
}

/// Owns a subscriber that was attached through [`Registry::subscribe`].
///
/// The registry only holds a weak handle, so dropping the subscription
/// expires the entry; it is reclaimed by the next sweep. [`Self::unsubscribe`]
/// removes it eagerly instead.
pub struct Subscription<S: ?Sized + Send + Sync> {
    subscriber: Arc<S>,
    token: SubscriberToken,
    registry: Weak<Registry<S>>,
}

impl<S: ?Sized + Send + Sync> Subscription<S> {
    pub(crate) fn new(subscriber: Arc<S>, token: SubscriberToken, registry: Weak<Registry<S>>) -> Self {
        Self {
            subscriber,
            token,
            registry,
        }
    }

    /// Token of the registry entry.
    #[must_use]
    pub const fn token(&self) -> SubscriberToken {
        self.token
    }

    /// The owned subscriber.
    #[must_use]
    pub const fn subscriber(&self) -> &Arc<S> {
        &self.subscriber
    }

    /// A fresh weak handle to the owned subscriber.
    #[must_use]
    pub fn handle(&self) -> SubscriberHandle<S> {
        SubscriberHandle::new(&self.subscriber)
    }

    /// Detaches from the registry now and drops the subscriber.
    ///
    /// Returns true if the entry was still present.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.detach_token(self.token))
    }
}

impl<S: ?Sized + Send + Sync> fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .field("registry_alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_fn_subscriber_no_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = FnSubscriber::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        Subscriber::update(&sub);
        Subscriber::update(&sub);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fn_subscriber_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = FnSubscriber::new(move |msg: &str| sink.lock().unwrap().push(msg.to_string()));

        MessageSubscriber::update(&sub, "hello");
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_subscription_unsubscribe() {
        let registry: Arc<Registry<dyn Subscriber>> = Arc::new(Registry::new());
        let subscription = registry.subscribe_fn(|| {});
        assert_eq!(registry.len(), 1);
        assert!(registry.contains_token(subscription.token()));

        assert!(subscription.unsubscribe());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscription_drop_expires_entry() {
        let registry: Arc<Registry<dyn Subscriber>> = Arc::new(Registry::new());
        let subscription = registry.subscribe_fn(|| {});
        let handle = subscription.handle();
        drop(subscription);

        assert!(handle.is_expired());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.cleanup_expired(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry: Arc<Registry<dyn Subscriber>> = Arc::new(Registry::new());
        let subscription = registry.subscribe_fn(|| {});
        drop(registry);

        assert!(!subscription.unsubscribe());
    }
}
