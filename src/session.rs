//! Session lifecycle and the request decorator every backend call goes through.
//!
//! `SessionManager::send` attaches the stored access token, and on a 401 runs a
//! single refresh exchange before re-issuing the call once. A rejected refresh
//! (or a second 401 on the re-issued call) ends the session: both durable
//! tokens are cleared and the status becomes `LoginRequired`.
//!
//! Refreshes are not serialized across calls. Two calls that hit a 401 at the
//! same time may each exchange the refresh token.

use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::models::{
    AuthResponse, LoginRequest, MeResponse, RefreshRequest, RefreshResponse, RegisterProfile,
    Session, SessionPatch, WizardStatusRequest,
};
use crate::state::{SessionState, SessionStatus};
use crate::storage::{FileTokenStore, StoredTokens, TokenStore};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const WIZARD_PATH: &str = "/auth/update-wizard";

/// A call waiting on its one permitted retry.
#[derive(Debug)]
struct PendingRequest {
    request: ApiRequest,
    retried: bool,
}

impl PendingRequest {
    fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }
}

/// Owns the single session of this client instance.
///
/// Cheap to clone; clones share the transport, the token store and the
/// session record. Call [`SessionManager::restore_session`] once at startup;
/// until it resolves the status stays [`SessionStatus::Loading`].
#[derive(Clone)]
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    state: SessionState,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            store,
            state: SessionState::new(),
        }
    }

    /// HTTP transport plus file-backed tokens, as configured.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        let store = FileTokenStore::new(config.token_path.clone());
        Ok(Self::new(Arc::new(transport), Arc::new(store)))
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn current(&self) -> Option<Session> {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest { email, password })?;
        let auth = self.authenticate(&request).await?;
        let session = self.establish(auth).await?;
        info!(user_id = %session.user_id, role = %session.role, "signed in");
        Ok(session)
    }

    pub async fn register(&self, profile: &RegisterProfile) -> Result<Session> {
        let request = ApiRequest::post(REGISTER_PATH).json(profile)?;
        let auth = self.authenticate(&request).await?;
        let session = self.establish(auth).await?;
        info!(user_id = %session.user_id, role = %session.role, "registered");
        Ok(session)
    }

    /// Clears both tokens and the session. Safe to call when signed out.
    pub async fn logout(&self) -> Result<()> {
        let was_signed_in = self.state.current().is_some();
        self.store.clear().await?;
        self.state.set(SessionStatus::SignedOut);
        if was_signed_in {
            info!("signed out");
        }
        Ok(())
    }

    /// Merges `patch` into the session without contacting the backend.
    /// Returns `None` when nobody is signed in.
    pub fn update_session(&self, patch: SessionPatch) -> Option<Session> {
        self.state.patch(patch)
    }

    /// Startup initialization: rebuilds the session from the stored tokens.
    ///
    /// Without a stored access token nothing is sent. A token the backend no
    /// longer accepts (after the usual refresh attempt) is cleared. Transport
    /// failures keep the tokens and are returned so the caller can retry.
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        let tokens = match self.store.load().await {
            Ok(tokens) => tokens,
            Err(err) => {
                self.state.set(SessionStatus::SignedOut);
                return Err(err);
            }
        };
        if tokens.access_token.is_none() {
            debug!("no stored access token, starting signed out");
            self.state.set(SessionStatus::SignedOut);
            return Ok(None);
        }

        match self.send_json::<MeResponse>(ApiRequest::get(ME_PATH)).await {
            Ok(me) => {
                // The decorator may have refreshed while validating.
                let tokens = self.store.load().await?;
                let session = Session::from_user(
                    me.into_user(),
                    tokens.access_token.unwrap_or_default(),
                    tokens.refresh_token.unwrap_or_default(),
                );
                self.state.sign_in(session.clone());
                info!(user_id = %session.user_id, "session restored");
                Ok(Some(session))
            }
            Err(err @ ClientError::Network(_)) => {
                warn!("could not reach backend to restore session: {err}");
                self.state.set(SessionStatus::SignedOut);
                Err(err)
            }
            Err(err) => {
                warn!("stored session rejected: {err}");
                self.store.clear().await?;
                self.state.set(SessionStatus::SignedOut);
                Ok(None)
            }
        }
    }

    /// Tells the backend the onboarding tour was seen, then flips the local
    /// flag. Failures are logged and otherwise ignored.
    pub async fn mark_onboarding_seen(&self) {
        match self.current() {
            Some(session) if !session.has_seen_onboarding => {}
            _ => return,
        }

        let request = match ApiRequest::put(WIZARD_PATH).json(&WizardStatusRequest {
            has_seen_wizard: true,
        }) {
            Ok(request) => request,
            Err(err) => {
                warn!("failed to encode onboarding status: {err}");
                return;
            }
        };

        match self.send(request).await {
            Ok(_) => {
                self.update_session(SessionPatch::onboarding_seen());
            }
            Err(err) => warn!("failed to update onboarding status: {err}"),
        }
    }

    /// The request decorator: bearer attachment plus the single-retry
    /// refresh protocol. Non-2xx responses other than 401 become
    /// `ClientError::Api`.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut pending = PendingRequest::new(request);
        loop {
            let bearer = self.store.access_token().await?;
            let response = self
                .transport
                .execute(&pending.request, bearer.as_deref())
                .await?;

            if response.status != StatusCode::UNAUTHORIZED {
                return response.error_for_status();
            }

            if pending.retried {
                warn!(path = %pending.request.path, "refreshed token rejected, ending session");
                self.expire().await?;
                return Err(ClientError::SessionExpired);
            }

            pending.retried = true;
            debug!(path = %pending.request.path, "access token rejected, refreshing");
            self.refresh_access_token().await?;
        }
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request).await?.into_json()
    }

    /// Exchanges the refresh token for a new access token and stores it.
    async fn refresh_access_token(&self) -> Result<()> {
        let tokens = self.store.load().await?;
        let Some(refresh_token) = tokens.refresh_token.clone() else {
            warn!("no refresh token stored, ending session");
            self.expire().await?;
            return Err(ClientError::SessionExpired);
        };

        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh_token: &refresh_token,
        })?;
        let response = self.transport.execute(&request, None).await?;
        let refreshed = if response.is_success() {
            response.into_json::<RefreshResponse>().ok()
        } else {
            warn!(status = %response.status, "refresh rejected: {}", response.message());
            None
        };
        let Some(refreshed) = refreshed else {
            self.expire().await?;
            return Err(ClientError::SessionExpired);
        };

        let rotated = refreshed.refresh_token.unwrap_or(refresh_token);
        self.store
            .save(&StoredTokens::new(refreshed.access_token.clone(), rotated.clone()))
            .await?;
        self.state.update_session(|session| {
            session.access_token = refreshed.access_token;
            session.refresh_token = rotated;
        });
        info!("access token refreshed");
        Ok(())
    }

    /// Irrecoverable authentication failure.
    async fn expire(&self) -> Result<()> {
        self.store.clear().await?;
        self.state.set(SessionStatus::LoginRequired);
        warn!("session expired, login required");
        Ok(())
    }

    /// Login and register share this: current bearer attached, no refresh
    /// retry, rejections surfaced as `Authentication`.
    async fn authenticate(&self, request: &ApiRequest) -> Result<AuthResponse> {
        let bearer = self.store.access_token().await?;
        let response = self.transport.execute(request, bearer.as_deref()).await?;

        match response.status {
            status if status.is_success() => response.into_json(),
            StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::CONFLICT
            | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ClientError::authentication(response.status, response.message()))
            }
            _ => Err(ClientError::api(response.status, response.message())),
        }
    }

    async fn establish(&self, auth: AuthResponse) -> Result<Session> {
        self.store
            .save(&StoredTokens::new(
                auth.access_token.clone(),
                auth.refresh_token.clone(),
            ))
            .await?;
        let session = Session::from_user(auth.user, auth.access_token, auth.refresh_token);
        self.state.sign_in(session.clone());
        Ok(session)
    }
}
