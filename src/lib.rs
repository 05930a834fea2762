//! # weakpub - weak-reference publish/subscribe registry
//!
//! A [`Registry`] notifies subscribers it does not own. Subscribers are
//! attached through [`SubscriberHandle`]s, which wrap `std::sync::Weak`, so
//! a registry never keeps a subscriber alive. Subscribers that have been
//! dropped are skipped during notification and their entries are reclaimed
//! lazily, either by the notify pass itself or by an explicit cleanup.
//!
//! ## Core Concepts
//!
//! - **Registry**: deduplicated, lock-guarded collection of weak handles
//! - **Subscriber**: a notification capability; three payload shapes are
//!   supported (none, message, back-reference to the registry)
//! - **Token**: stable id issued per attached entry, usable after the
//!   subscriber is gone
//! - **Memberships**: optional subscriber-side record of joined registries,
//!   left automatically on drop
//! - **Notifier**: optional background thread that runs notify passes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weakpub::{Registry, Subscriber, SubscriberHandle};
//!
//! struct Printer;
//! impl Subscriber for Printer {
//!     fn update(&self) { println!("changed"); }
//! }
//!
//! let registry: Registry<dyn Subscriber> = Registry::new();
//! let printer: Arc<dyn Subscriber> = Arc::new(Printer);
//! registry.attach(&SubscriberHandle::new(&printer));
//! registry.notify();
//! drop(printer);
//! registry.notify(); // skips and reclaims the expired entry
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod container;
pub mod error;
pub mod handle;
pub mod membership;
pub mod notifier;
pub mod registry;
pub mod subscriber;

// Re-export primary types at crate root for convenience
pub use config::{RegistryConfig, RegistryConfigBuilder, SweepPolicy};
pub use container::{Emplace, ExecutionPolicy};
pub use error::{ConfigError, ExecutionError, ValidationError, WeakPubError, WeakPubResult};
pub use handle::{HandleKey, RegistryId, SubscriberHandle, SubscriberToken};
pub use membership::{Memberships, Unsubscribe};
pub use notifier::Notifier;
pub use registry::{NotifyReport, Registry, RegistryStats};
pub use subscriber::{FnSubscriber, MessageSubscriber, SourceSubscriber, Subscriber, Subscription};
