//! Session deduplication and ownership.
//!
//! A [`SessionManager`] owns every live [`Session`] and guarantees that at
//! most one exists per [`SessionKey`]: opening the same parameters twice
//! returns the same session instead of opening a second stream.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sselink_transport_traits::{StreamTransport, TransportError};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::event::{RemoteError, RetryError, SessionEvent};
use crate::key::SessionKey;
use crate::params::ConnectionParameters;
use crate::session::{Detach, Session, SessionHandle};

struct ManagerInner {
    transport: Arc<dyn StreamTransport>,
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl Detach for ManagerInner {
    fn detach(&self, key: &SessionKey, session: &Session) {
        let removed = {
            let mut sessions = self.sessions.lock();
            let owned = sessions
                .get(key)
                .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), session));
            let removed = owned.then(|| sessions.remove(key)).flatten();
            if removed.is_some() && sessions.is_empty() {
                info!(transport = self.transport.name(), "Last session closed, session manager idle");
            }
            removed
        };
        drop(removed);
    }
}

/// Opens, deduplicates and closes sessions over one transport.
///
/// Cloning the manager shares its session table.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("transport", &self.inner.transport)
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl SessionManager {
    /// Creates a manager that opens streams with `transport`.
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a manager over the HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the HTTP client cannot be built.
    #[cfg(feature = "http")]
    pub fn http(config: sselink_http::HttpStreamConfig) -> Result<Self> {
        let transport = sselink_http::HttpStreamTransport::new(config)?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Creates a manager from a loaded [`ClientConfig`](crate::ClientConfig).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the HTTP client cannot be built.
    #[cfg(feature = "http")]
    pub fn from_config(config: &crate::ClientConfig) -> Result<Self> {
        Self::http(config.http.clone())
    }

    /// Opens a session for `params`, or returns the live session already
    /// open for equal parameters.
    ///
    /// Must be called within a tokio runtime. Failures of the stream itself
    /// are reported to the session's retry-error listeners, not here.
    ///
    /// # Errors
    ///
    /// Returns a configuration error ([`SessionError::is_configuration`]) for
    /// an unusable URL or header, a request the transport rejects, or when no
    /// tokio runtime is available.
    pub fn open(&self, params: &ConnectionParameters) -> Result<SessionHandle> {
        let request = params.to_request()?;
        let key = SessionKey::compute(params);

        let mut sessions = self.inner.sessions.lock();
        if let Some(existing) = sessions.get(&key)
            && !existing.is_closed()
        {
            debug!(session_key = %key, "Reusing open session");
            return Ok(SessionHandle::new(Arc::clone(existing)));
        }
        sessions.retain(|_, session| !session.is_closed());

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SessionError::configuration("sessions must be opened within a tokio runtime")
        })?;

        let owner: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        let session = Session::new(key.clone(), params.clone(), request.url.clone(), Some(owner));

        match self.inner.transport.establish(request) {
            Ok(stream) => session.attach(stream, &runtime),
            Err(err @ TransportError::ConfigurationError(_)) => return Err(err.into()),
            Err(err) => {
                warn!(session_key = %key, error = %err, "Transport failed to start stream");
                session.deliver(SessionEvent::RetryError(RetryError {
                    cause: Some(RemoteError {
                        message: err.to_string(),
                        stack: None,
                    }),
                    response: None,
                }));
            }
        }

        if sessions.is_empty() {
            info!(transport = self.inner.transport.name(), "Session manager active");
        }
        sessions.insert(key.clone(), Arc::clone(&session));
        info!(session_key = %key, url = %session.url(), "Session opened");

        Ok(SessionHandle::new(session))
    }

    /// Closes `session` and forgets it. Returns `false` if it was already closed.
    pub fn close(&self, session: &SessionHandle) -> bool {
        session.close()
    }

    /// The live session for `key`, if any.
    pub fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.inner
            .sessions
            .lock()
            .get(key)
            .filter(|session| !session.is_closed())
            .map(|session| SessionHandle::new(Arc::clone(session)))
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .values()
            .filter(|session| !session.is_closed())
            .count()
    }

    /// Whether any session is live.
    pub fn is_active(&self) -> bool {
        self.session_count() > 0
    }

    /// Closes every session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.inner.sessions.lock().values().cloned().collect();
        sessions.iter().filter(|session| session.close()).count()
    }
}
