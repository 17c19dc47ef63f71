//! Listener callbacks and their identities.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::{Message, RetryError, RetryNotice};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registered listener.
///
/// Listeners are addressed by identity, never by content: two handlers built
/// from identical closures are still different listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A listener callback with a stable identity.
///
/// Clones share the identity, so a clone can be used to remove the listener
/// that was registered with the original.
pub struct Handler<A: ?Sized> {
    id: ListenerId,
    callback: Arc<dyn Fn(&A) + Send + Sync>,
}

impl<A: ?Sized> Handler<A> {
    /// Wraps `callback` under a fresh identity.
    pub fn new(callback: impl Fn(&A) + Send + Sync + 'static) -> Self {
        Self {
            id: ListenerId::next(),
            callback: Arc::new(callback),
        }
    }

    /// The identity used to remove this listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn call(&self, arg: &A) {
        (self.callback)(arg);
    }
}

impl Handler<()> {
    /// Wraps an argument-less callback, for open and closed signals.
    pub fn signal(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self::new(move |_: &()| callback())
    }
}

impl<A: ?Sized> Clone for Handler<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<A: ?Sized> PartialEq for Handler<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A: ?Sized> Eq for Handler<A> {}

impl<A: ?Sized> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

impl<A: ?Sized> From<&Handler<A>> for ListenerId {
    fn from(handler: &Handler<A>) -> Self {
        handler.id
    }
}

/// Receives every message, or messages of one event type.
pub type MessageHandler = Handler<Message>;
/// Receives comment lines.
pub type CommentHandler = Handler<str>;
/// Notified when the stream opens.
pub type OpenHandler = Handler<()>;
/// Notified when the session closes.
pub type ClosedHandler = Handler<()>;
/// Receives server retry delays.
pub type RetryNoticeHandler = Handler<RetryNotice>;
/// Receives failed attempts.
pub type RetryErrorHandler = Handler<RetryError>;
