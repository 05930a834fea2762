use std::sync::Arc;

use crate::subscriber::{FnSubscriber, MessageSubscriber, SourceSubscriber, Subscriber, Subscription};

use super::{NotifyReport, Registry};

impl Registry<dyn Subscriber> {
    /// Calls [`Subscriber::update`] on every live subscriber.
    pub fn notify(&self) -> NotifyReport {
        self.notify_each(|subscriber| subscriber.update())
    }

    /// Attaches a closure and returns the subscription that keeps it alive.
    pub fn subscribe_fn<F>(self: &Arc<Self>, callback: F) -> Subscription<dyn Subscriber>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let subscriber: Arc<dyn Subscriber> = Arc::new(FnSubscriber::new(callback));
        self.subscribe(subscriber)
    }
}

impl Registry<dyn MessageSubscriber> {
    /// Calls [`MessageSubscriber::update`] with `message` on every live
    /// subscriber.
    pub fn notify_message(&self, message: &str) -> NotifyReport {
        self.notify_each(|subscriber| subscriber.update(message))
    }

    /// Attaches a closure and returns the subscription that keeps it alive.
    pub fn subscribe_fn<F>(self: &Arc<Self>, callback: F) -> Subscription<dyn MessageSubscriber>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let subscriber: Arc<dyn MessageSubscriber> = Arc::new(FnSubscriber::new(callback));
        self.subscribe(subscriber)
    }
}

impl Registry<dyn SourceSubscriber> {
    /// Calls [`SourceSubscriber::update`] with this registry on every live
    /// subscriber.
    pub fn notify_source(&self) -> NotifyReport {
        self.notify_each(|subscriber| subscriber.update(self))
    }
}
