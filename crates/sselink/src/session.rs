//! One logical event stream and its listeners.
//!
//! A [`Session`] moves through `Idle → Open ⇄ Retrying → Closed`. The
//! transport drives every transition except the last one, which only an
//! explicit [`Session::close`] performs. Frames are decoded and handed to the
//! [`SubscriptionRegistry`] in the order the transport emitted them.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use sselink_transport_traits::{RawFrame, StreamHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::decoder::EventDecoder;
use crate::event::SessionEvent;
use crate::handler::{
    ClosedHandler, CommentHandler, ListenerId, MessageHandler, OpenHandler, RetryErrorHandler,
    RetryNoticeHandler,
};
use crate::key::SessionKey;
use crate::params::ConnectionParameters;
use crate::registry::{Subscription, SubscriptionRegistry};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no stream established yet.
    Idle,
    /// The stream is established.
    Open,
    /// An attempt failed and the transport is re-dialling.
    Retrying,
    /// Closed by the caller. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Retrying => "retrying",
            Self::Closed => "closed",
        })
    }
}

/// Notified when a session closes so its owner can forget it.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, key: &SessionKey, session: &Session);
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    /// A closed signal was already delivered.
    closed_announced: bool,
    terminator: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// A logical subscription to one remote event stream.
pub struct Session {
    key: SessionKey,
    params: ConnectionParameters,
    url: String,
    registry: SubscriptionRegistry,
    /// Guards state transitions and delivery. Reentrant so callbacks can
    /// close the session or query its state.
    lifecycle: ReentrantMutex<RefCell<Lifecycle>>,
    /// Lock-free mirror of `state == Closed`.
    closed: AtomicBool,
    owner: Option<Weak<dyn Detach>>,
    this: Weak<Session>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .field("listeners", &self.registry.len())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        key: SessionKey,
        params: ConnectionParameters,
        url: String,
        owner: Option<Weak<dyn Detach>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            key,
            params,
            url,
            registry: SubscriptionRegistry::new(),
            lifecycle: ReentrantMutex::new(RefCell::new(Lifecycle {
                state: SessionState::Idle,
                closed_announced: false,
                terminator: None,
                task: None,
            })),
            closed: AtomicBool::new(false),
            owner,
            this: this.clone(),
        })
    }

    /// Starts the receive task for `stream` on `runtime`.
    pub(crate) fn attach(&self, stream: StreamHandle, runtime: &tokio::runtime::Handle) {
        let guard = self.lifecycle.lock();
        let terminator = stream.terminator();
        if guard.borrow().state == SessionState::Closed {
            terminator.cancel();
            return;
        }

        let task = runtime.spawn(receive_loop(self.this.clone(), stream));
        let mut lifecycle = guard.borrow_mut();
        lifecycle.terminator = Some(terminator);
        lifecycle.task = Some(task);
    }

    /// Identity of this session.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// The URL the stream was requested from, query included.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The parameters this session was opened with.
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().borrow().state
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// A reference that does not keep the session alive.
    pub fn downgrade(&self) -> WeakSession {
        WeakSession(self.this.clone())
    }

    /// Adds a listener for messages of event type `event`.
    ///
    /// Using the same handler again, for this or another category, replaces
    /// its earlier registration.
    pub fn add_event_listener(&self, event: impl Into<String>, handler: MessageHandler) -> ListenerId {
        self.registry.register_typed(event, handler)
    }

    /// Sets the message listener, replacing the previous one.
    pub fn on_message(&self, handler: MessageHandler) -> ListenerId {
        self.registry.assign(Subscription::Message(handler))
    }

    /// Sets the comment listener, replacing the previous one.
    pub fn on_comment(&self, handler: CommentHandler) -> ListenerId {
        self.registry.assign(Subscription::Comment(handler))
    }

    /// Sets the open listener, replacing the previous one.
    pub fn on_open(&self, handler: OpenHandler) -> ListenerId {
        self.registry.assign(Subscription::Open(handler))
    }

    /// Sets the closed listener, replacing the previous one.
    pub fn on_closed(&self, handler: ClosedHandler) -> ListenerId {
        self.registry.assign(Subscription::Closed(handler))
    }

    /// Sets the retry-delay listener, replacing the previous one.
    pub fn on_retry_notice(&self, handler: RetryNoticeHandler) -> ListenerId {
        self.registry.assign(Subscription::RetryNotice(handler))
    }

    /// Sets the retry-error listener, replacing the previous one.
    pub fn on_retry_error(&self, handler: RetryErrorHandler) -> ListenerId {
        self.registry.assign(Subscription::RetryError(handler))
    }

    /// Adds a listener without occupying a setter slot.
    pub fn subscribe(&self, subscription: Subscription) -> ListenerId {
        self.registry.register(subscription)
    }

    /// Removes a listener. Once this returns, the listener is never invoked
    /// again, even for frames that were already in flight.
    pub fn remove(&self, listener: impl Into<ListenerId>) -> bool {
        self.registry.remove(listener.into())
    }

    /// Removes several listeners, as if by repeated [`remove`](Self::remove).
    pub fn remove_many<I, L>(&self, listeners: I) -> usize
    where
        I: IntoIterator<Item = L>,
        L: Into<ListenerId>,
    {
        self.registry
            .remove_many(listeners.into_iter().map(Into::into))
    }

    /// Removes every listener.
    pub fn flush_all_listeners(&self) -> usize {
        self.registry.flush_all()
    }

    /// Decodes `frame` and delivers it to the matching listeners.
    ///
    /// This is what the receive task calls for every frame; bridges that
    /// receive frames by other means can call it directly. Returns `false`
    /// once the session is closed.
    pub fn deliver_frame(&self, frame: RawFrame) -> bool {
        let kind = frame.kind;
        match EventDecoder::decode(frame) {
            Ok(event) => self.deliver(event),
            Err(anomaly) => {
                debug!(session_key = %self.key, kind = %kind, error = %anomaly, "Dropping frame");
                !self.is_closed()
            }
        }
    }

    pub(crate) fn deliver(&self, event: SessionEvent) -> bool {
        let guard = self.lifecycle.lock();
        {
            let mut lifecycle = guard.borrow_mut();
            if lifecycle.state == SessionState::Closed {
                trace!(session_key = %self.key, "Ignoring event for closed session");
                return false;
            }
            let next = match &event {
                SessionEvent::Open => Some(SessionState::Open),
                SessionEvent::RetryError(_) | SessionEvent::Reconnecting => {
                    Some(SessionState::Retrying)
                }
                SessionEvent::Closed => {
                    lifecycle.closed_announced = true;
                    None
                }
                _ => None,
            };
            if let Some(next) = next
                && next != lifecycle.state
            {
                debug!(
                    session_key = %self.key,
                    from = %lifecycle.state,
                    to = %next,
                    "Session state changed"
                );
                lifecycle.state = next;
            }
        }

        let delivered = self.registry.dispatch(&event);
        if let Some(category) = event.category() {
            trace!(session_key = %self.key, category = %category, delivered, "Dispatched event");
        }
        true
    }

    /// Closes the session: terminates the transport, delivers a closed signal
    /// unless one was already delivered, removes every listener and forgets
    /// the transport. Closing a closed session does nothing.
    ///
    /// Once this returns no listener of this session is invoked again.
    /// Returns `false` if the session was already closed.
    pub fn close(&self) -> bool {
        let guard = self.lifecycle.lock();
        let (announce, terminator, task) = {
            let mut lifecycle = guard.borrow_mut();
            if lifecycle.state == SessionState::Closed {
                return false;
            }
            lifecycle.state = SessionState::Closed;
            self.closed.store(true, Ordering::Release);
            let announce = !lifecycle.closed_announced;
            lifecycle.closed_announced = true;
            (announce, lifecycle.terminator.take(), lifecycle.task.take())
        };

        if let Some(terminator) = terminator {
            terminator.cancel();
        }
        if announce {
            self.registry.dispatch(&SessionEvent::Closed);
        }
        let flushed = self.registry.flush_all();
        if let Some(task) = task {
            task.abort();
        }
        drop(guard);

        info!(session_key = %self.key, listeners = flushed, "Session closed");

        if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
            owner.detach(&self.key, self);
        }
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().get_mut();
        if let Some(terminator) = lifecycle.terminator.take() {
            terminator.cancel();
        }
        if let Some(task) = lifecycle.task.take() {
            task.abort();
        }
    }
}

async fn receive_loop(session: Weak<Session>, mut stream: StreamHandle) {
    while let Some(frame) = stream.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        if !session.deliver_frame(frame) {
            break;
        }
    }
    trace!("Receive loop finished");
}

/// A shared handle to an open session.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<Session>);

impl SessionHandle {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self(session)
    }

    /// Whether both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

/// A weak reference to a session, for use inside listeners.
#[derive(Debug, Clone, Default)]
pub struct WeakSession(Weak<Session>);

impl WeakSession {
    /// The session, if it is still alive.
    pub fn upgrade(&self) -> Option<SessionHandle> {
        self.0.upgrade().map(SessionHandle)
    }
}
