//! Listener registry shared by the delivery and registration paths.
//!
//! Registration, removal and delivery all serialize on one reentrant lock.
//! Delivery holds the lock while callbacks run, so once [`remove`] or
//! [`flush_all`] returns on another thread the removed listener is never
//! invoked again. Because the lock is reentrant, callbacks may themselves
//! register or remove listeners (or close the session) without deadlocking;
//! an entry removed or replaced mid-dispatch is skipped for the rest of it.
//!
//! [`remove`]: SubscriptionRegistry::remove
//! [`flush_all`]: SubscriptionRegistry::flush_all

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use parking_lot::ReentrantMutex;
use tracing::trace;

use crate::event::{Category, SessionEvent};
use crate::handler::{
    ClosedHandler, CommentHandler, ListenerId, MessageHandler, OpenHandler, RetryErrorHandler,
    RetryNoticeHandler,
};

/// A listener bound to one category.
#[derive(Debug, Clone)]
pub enum Subscription {
    /// Messages whose event type equals `tag`.
    Event {
        /// Event type to accept.
        tag: String,
        /// Callback.
        handler: MessageHandler,
    },
    /// Every message.
    Message(MessageHandler),
    /// Comment lines.
    Comment(CommentHandler),
    /// Open signals.
    Open(OpenHandler),
    /// Closed signals.
    Closed(ClosedHandler),
    /// Server retry delays.
    RetryNotice(RetryNoticeHandler),
    /// Failed attempts.
    RetryError(RetryErrorHandler),
}

impl Subscription {
    /// Identity of the wrapped handler.
    pub fn id(&self) -> ListenerId {
        match self {
            Self::Event { handler, .. } | Self::Message(handler) => handler.id(),
            Self::Comment(handler) => handler.id(),
            Self::Open(handler) | Self::Closed(handler) => handler.id(),
            Self::RetryNotice(handler) => handler.id(),
            Self::RetryError(handler) => handler.id(),
        }
    }

    /// The category this subscription is delivered on.
    pub fn category(&self) -> Category {
        match self {
            Self::Event { .. } | Self::Message(_) => Category::Message,
            Self::Comment(_) => Category::Comment,
            Self::Open(_) => Category::Open,
            Self::Closed(_) => Category::Closed,
            Self::RetryNotice(_) => Category::RetryNotice,
            Self::RetryError(_) => Category::RetryError,
        }
    }

    /// Invokes the handler if `event` is meant for it. Returns whether it was invoked.
    fn deliver(&self, event: &SessionEvent) -> bool {
        match (self, event) {
            (Self::Event { tag, handler }, SessionEvent::Message(message)) => {
                if message.event != *tag {
                    return false;
                }
                handler.call(message);
            }
            (Self::Message(handler), SessionEvent::Message(message)) => handler.call(message),
            (Self::Comment(handler), SessionEvent::Comment(text)) => handler.call(text),
            (Self::Open(handler), SessionEvent::Open)
            | (Self::Closed(handler), SessionEvent::Closed) => handler.call(&()),
            (Self::RetryNotice(handler), SessionEvent::RetryNotice(notice)) => {
                handler.call(notice);
            }
            (Self::RetryError(handler), SessionEvent::RetryError(error)) => handler.call(error),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Default)]
struct Entries {
    /// Listener identity to (generation, subscription).
    by_id: BTreeMap<ListenerId, (u64, Subscription)>,
    /// Setter-style slots, each holding at most one listener.
    slots: HashMap<Category, ListenerId>,
    next_generation: u64,
}

impl Entries {
    /// Inserts `subscription`, dropping any slot its identity held before.
    fn insert(&mut self, subscription: Subscription) -> Option<Subscription> {
        let id = subscription.id();
        self.next_generation += 1;
        self.slots.retain(|_, occupant| *occupant != id);
        self.by_id
            .insert(id, (self.next_generation, subscription))
            .map(|(_, previous)| previous)
    }

    fn remove(&mut self, id: ListenerId) -> Option<Subscription> {
        let (_, removed) = self.by_id.remove(&id)?;
        self.slots.retain(|_, occupant| *occupant != id);
        Some(removed)
    }

    fn is_current(&self, id: ListenerId, generation: u64) -> bool {
        self.by_id
            .get(&id)
            .is_some_and(|(current, _)| *current == generation)
    }
}

/// Maps listener identities to their subscriptions and fans events out to them.
///
/// Each identity has at most one subscription; registering an identity again
/// replaces its previous subscription.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: ReentrantMutex<RefCell<Entries>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscription` under its handler's identity, replacing any
    /// previous subscription of that identity.
    pub fn register(&self, subscription: Subscription) -> ListenerId {
        let id = subscription.id();
        let category = subscription.category();
        let guard = self.entries.lock();
        let replaced = guard.borrow_mut().insert(subscription);
        if let Some(previous) = replaced {
            trace!(listener_id = %id, previous = %previous.category(), "Replaced listener");
        }
        trace!(listener_id = %id, category = %category, "Registered listener");
        id
    }

    /// Registers `handler` for messages whose event type equals `tag`.
    pub fn register_typed(&self, tag: impl Into<String>, handler: MessageHandler) -> ListenerId {
        self.register(Subscription::Event {
            tag: tag.into(),
            handler,
        })
    }

    /// Installs `subscription` in the setter slot for its category, releasing
    /// the listener that occupied the slot before.
    pub fn assign(&self, subscription: Subscription) -> ListenerId {
        let id = subscription.id();
        let category = subscription.category();
        let guard = self.entries.lock();
        let mut entries = guard.borrow_mut();
        if let Some(previous) = entries.slots.get(&category).copied()
            && previous != id
        {
            entries.remove(previous);
            trace!(listener_id = %previous, category = %category, "Released slot listener");
        }
        entries.insert(subscription);
        entries.slots.insert(category, id);
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let guard = self.entries.lock();
        let removed = guard.borrow_mut().remove(id).is_some();
        if removed {
            trace!(listener_id = %id, "Removed listener");
        }
        removed
    }

    /// Removes every listener in `ids`. Returns how many were registered.
    pub fn remove_many<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = ListenerId>,
    {
        let guard = self.entries.lock();
        let mut entries = guard.borrow_mut();
        ids.into_iter()
            .filter(|id| entries.remove(*id).is_some())
            .count()
    }

    /// Removes every listener. Returns how many there were.
    pub fn flush_all(&self) -> usize {
        let guard = self.entries.lock();
        let mut entries = guard.borrow_mut();
        let count = entries.by_id.len();
        entries.by_id.clear();
        entries.slots.clear();
        count
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.lock().borrow().by_id.contains_key(&id)
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().borrow().by_id.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener of its category, oldest handler
    /// first. Returns the number of callbacks invoked.
    pub fn dispatch(&self, event: &SessionEvent) -> usize {
        let Some(category) = event.category() else {
            return 0;
        };

        let guard = self.entries.lock();
        let targets: Vec<(ListenerId, u64, Subscription)> = guard
            .borrow()
            .by_id
            .iter()
            .filter(|(_, (_, subscription))| subscription.category() == category)
            .map(|(id, (generation, subscription))| (*id, *generation, subscription.clone()))
            .collect();

        let mut delivered = 0;
        for (id, generation, subscription) in targets {
            // A callback earlier in this pass may have removed or replaced it
            if !guard.borrow().is_current(id, generation) {
                continue;
            }
            if subscription.deliver(event) {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Message, RetryError, RetryNotice};
    use crate::handler::Handler;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_message_handler() -> (MessageHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler = MessageHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    fn message(event: &str) -> SessionEvent {
        SessionEvent::Message(Message {
            id: String::new(),
            event: event.to_string(),
            data: "{}".to_string(),
        })
    }

    #[test]
    fn test_typed_dispatch_filters_by_event() {
        let registry = SubscriptionRegistry::new();
        let (handler, count) = counting_message_handler();
        registry.register_typed("LOCATION_FEED", handler);

        registry.dispatch(&message("LOCATION_FEED"));
        registry.dispatch(&message("OTHER"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reregistering_replaces() {
        let registry = SubscriptionRegistry::new();
        let (handler, count) = counting_message_handler();

        registry.register(Subscription::Message(handler.clone()));
        registry.register(Subscription::Message(handler.clone()));
        registry.register_typed("A", handler);
        assert_eq!(registry.len(), 1);

        registry.dispatch(&message("B"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        registry.dispatch(&message("A"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_assign_releases_previous_slot_holder() {
        let registry = SubscriptionRegistry::new();
        let (first, first_count) = counting_message_handler();
        let (second, second_count) = counting_message_handler();

        registry.assign(Subscription::Message(first.clone()));
        registry.assign(Subscription::Message(second));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(first.id()));

        registry.dispatch(&message("x"));
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_moving_handler_between_slots() {
        let registry = SubscriptionRegistry::new();
        let shared = Handler::signal(|| {});
        let other = Handler::signal(|| {});

        registry.assign(Subscription::Open(shared.clone()));
        registry.assign(Subscription::Closed(shared.clone()));
        registry.assign(Subscription::Open(other.clone()));

        assert!(registry.contains(shared.id()));
        assert!(registry.contains(other.id()));
        assert_eq!(registry.dispatch(&SessionEvent::Closed), 1);
        assert_eq!(registry.dispatch(&SessionEvent::Open), 1);
    }

    #[test]
    fn test_slot_and_listeners_coexist() {
        let registry = SubscriptionRegistry::new();
        let (slot, slot_count) = counting_message_handler();
        let (extra, extra_count) = counting_message_handler();

        registry.assign(Subscription::Message(slot));
        registry.register(Subscription::Message(extra));
        assert_eq!(registry.dispatch(&message("x")), 2);
        assert_eq!(slot_count.load(Ordering::SeqCst), 1);
        assert_eq!(extra_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (handler, _) = counting_message_handler();
        let id = registry.register(Subscription::Message(handler));

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_categories_are_isolated() {
        let registry = SubscriptionRegistry::new();
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        registry.register(Subscription::Open(Handler::signal(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let notices = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notices);
        registry.register(Subscription::RetryNotice(Handler::new(
            move |notice: &RetryNotice| {
                assert_eq!(notice.retry_after_millis, 250);
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )));

        registry.dispatch(&SessionEvent::Open);
        registry.dispatch(&SessionEvent::Closed);
        registry.dispatch(&SessionEvent::RetryError(RetryError::default()));
        registry.dispatch(&SessionEvent::RetryNotice(RetryNotice {
            retry_after_millis: 250,
        }));
        registry.dispatch(&SessionEvent::Reconnecting);

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(notices.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_remove_later_listener() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (victim, victim_count) = counting_message_handler();
        let victim_id = victim.id();

        let remover = {
            let registry = Arc::clone(&registry);
            MessageHandler::new(move |_| {
                registry.remove(victim_id);
            })
        };
        registry.register(Subscription::Message(remover));
        registry.register(Subscription::Message(victim));

        assert_eq!(registry.dispatch(&message("x")), 1);
        assert_eq!(victim_count.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_callback_can_register_without_receiving_current_event() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (late, late_count) = counting_message_handler();

        let registrar = {
            let registry = Arc::clone(&registry);
            MessageHandler::new(move |_| {
                registry.register(Subscription::Message(late.clone()));
            })
        };
        registry.register(Subscription::Message(registrar));

        registry.dispatch(&message("first"));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        registry.dispatch(&message("second"));
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_all() {
        let registry = SubscriptionRegistry::new();
        let (a, a_count) = counting_message_handler();
        let (b, _) = counting_message_handler();
        registry.assign(Subscription::Message(a));
        registry.register_typed("x", b);

        assert_eq!(registry.flush_all(), 2);
        assert_eq!(registry.dispatch(&message("x")), 0);
        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(registry.flush_all(), 0);
    }
}
