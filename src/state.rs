use crate::models::{Session, SessionPatch};
use std::sync::Arc;
use tokio::sync::watch;

/// What the view layer should render for the current client instance.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// Startup restore has not resolved yet; do not redirect to login.
    Loading,
    SignedOut,
    SignedIn(Session),
    /// The session failed irrecoverably; send the user to the login screen.
    LoginRequired,
}

impl SessionStatus {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionStatus::SignedIn(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionStatus::Loading)
    }
}

/// Shared handle on the single session record. Only the session manager
/// writes through it; everyone else reads or subscribes.
#[derive(Clone)]
pub struct SessionState {
    status: Arc<watch::Sender<SessionStatus>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Loading);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn current(&self) -> Option<Session> {
        self.status.borrow().session().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Resolves once the startup restore has settled.
    pub async fn ready(&self) -> SessionStatus {
        let mut receiver = self.subscribe();
        match receiver.wait_for(|status| !status.is_loading()).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }

    pub(crate) fn set(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }

    pub(crate) fn sign_in(&self, session: Session) {
        self.set(SessionStatus::SignedIn(session));
    }

    /// Applies `patch` to the signed-in session. Returns the merged session,
    /// or `None` (and changes nothing) when nobody is signed in.
    pub(crate) fn patch(&self, patch: SessionPatch) -> Option<Session> {
        self.update_session(|session| session.apply(patch))
    }

    pub(crate) fn update_session(&self, update: impl FnOnce(&mut Session)) -> Option<Session> {
        let mut merged = None;
        self.status.send_if_modified(|status| match status {
            SessionStatus::SignedIn(session) => {
                update(session);
                merged = Some(session.clone());
                true
            }
            _ => false,
        });
        merged
    }
}
