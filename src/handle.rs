//! Weak subscriber handles and the identifiers used to key them.
//!
//! A [`SubscriberHandle`] never keeps its subscriber alive. Identity is the
//! address of the referenced allocation, which stays pinned for as long as any
//! `Weak` to it exists, so a handle held by a registry cannot collide with a
//! later allocation at the same address.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier issued by a registry for one attached subscriber entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberToken(Uuid);

impl SubscriberToken {
    /// Create a new random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriberToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryId(Uuid);

impl RegistryId {
    /// Create a new random registry id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RegistryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of the allocation a handle refers to.
///
/// Usable as a key in hash-based containers. Only meaningful while some
/// `Weak` or `Arc` to the allocation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey(usize);

/// Non-owning handle to a subscriber.
///
/// Equality means "both handles are live and point at the same object".
/// An expired handle compares unequal to everything, itself included, which
/// is why this type implements `PartialEq` but not `Eq`.
pub struct SubscriberHandle<S: ?Sized> {
    weak: Weak<S>,
}

impl<S: ?Sized> SubscriberHandle<S> {
    /// Creates a handle to the object behind `strong`.
    #[must_use]
    pub fn new(strong: &Arc<S>) -> Self {
        Self {
            weak: Arc::downgrade(strong),
        }
    }

    /// Wraps an existing weak reference.
    #[must_use]
    pub const fn from_weak(weak: Weak<S>) -> Self {
        Self { weak }
    }

    /// True if the subscriber no longer exists.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.weak.strong_count() == 0
    }

    /// Upgrades to a strong reference if the subscriber is still alive.
    ///
    /// The returned `Arc` keeps the subscriber alive for as long as the caller
    /// holds it, even if every other owner drops theirs concurrently.
    #[must_use]
    pub fn try_resolve(&self) -> Option<Arc<S>> {
        self.weak.upgrade()
    }

    /// Address key of the referenced allocation.
    #[must_use]
    pub fn key(&self) -> HandleKey {
        HandleKey(self.weak.as_ptr().cast::<()>() as usize)
    }

    /// True if both handles point at the same allocation, live or not.
    #[must_use]
    pub fn same_referent(&self, other: &Self) -> bool {
        self.key() == other.key()
    }

    /// The wrapped weak reference.
    #[must_use]
    pub const fn as_weak(&self) -> &Weak<S> {
        &self.weak
    }
}

impl<S: ?Sized> Clone for SubscriberHandle<S> {
    fn clone(&self) -> Self {
        Self {
            weak: Weak::clone(&self.weak),
        }
    }
}

impl<S: ?Sized> PartialEq for SubscriberHandle<S> {
    fn eq(&self, other: &Self) -> bool {
        !self.is_expired() && !other.is_expired() && self.same_referent(other)
    }
}

impl<S: ?Sized> Hash for SubscriberHandle<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<S: ?Sized> fmt::Debug for SubscriberHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("key", &self.key())
            .field("expired", &self.is_expired())
            .finish()
    }
}

impl<S: ?Sized> From<&Arc<S>> for SubscriberHandle<S> {
    fn from(strong: &Arc<S>) -> Self {
        Self::new(strong)
    }
}
