use std::sync::Arc;
use std::time::Duration;

use crate::auth::{self, CredentialStore, Navigator, SessionController};
use crate::authenticator::RequestAuthenticator;
use crate::coordinator::{RefreshCoordinator, RefreshState};
use crate::error::{ClientError, Result};
use crate::retry::{check_expiry, RequestAttempt, RetryDispatcher};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Authenticated HTTP client
///
/// Cloning yields another handle to the same session: all clones share one
/// credential store and one refresh coordinator.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    session: Arc<SessionController>,
    authenticator: RequestAuthenticator,
    coordinator: Arc<RefreshCoordinator>,
    dispatcher: RetryDispatcher,
}

impl HttpClient {
    /// Create a new client around a transport
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        refresh_timeout: Duration,
    ) -> Self {
        let session = Arc::new(SessionController::new(store.clone(), navigator));
        let authenticator = RequestAuthenticator::new(store.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            session.clone(),
            refresh_timeout,
        ));
        let dispatcher = RetryDispatcher::new(transport.clone(), authenticator.clone());

        Self {
            inner: Arc::new(ClientInner {
                transport,
                store,
                session,
                authenticator,
                coordinator,
                dispatcher,
            }),
        }
    }

    /// Send a request with the current credential
    ///
    /// Handles:
    /// - 401 on a first attempt: coordinated refresh, then one replay
    /// - 401 on the replay: `AuthenticationExhausted`, session terminated
    /// - refresh failure: `SessionInvalidated`, session terminated
    /// - everything else is returned as-is (network errors propagate)
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let attempt = RequestAttempt::first(request);

        let mut outgoing = attempt.request().clone();
        let used_token = self.inner.authenticator.authenticate(&mut outgoing);

        tracing::debug!(
            request_id = %request_id,
            method = %outgoing.method,
            path = %outgoing.path,
            authenticated = used_token.is_some(),
            "Sending request"
        );

        let response = self.inner.transport.execute(outgoing).await.map_err(|e| {
            tracing::warn!(request_id = %request_id, error = %e, "Request failed");
            e
        })?;

        match check_expiry(&attempt, response) {
            Err(ClientError::CredentialExpired) => {}
            other => return other,
        }

        tracing::info!(
            request_id = %request_id,
            method = %attempt.request().method,
            path = %attempt.request().path,
            "Access credential rejected, waiting for refresh"
        );

        let ticket = self
            .inner
            .coordinator
            .await_fresh_token(attempt, used_token)
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %request_id, error = %e, "Request abandoned");
                e
            })?;

        match self
            .inner
            .dispatcher
            .replay(&ticket.attempt, &ticket.token)
            .await
        {
            Err(e @ ClientError::AuthenticationExhausted { .. }) => {
                tracing::error!(request_id = %request_id, "Authentication exhausted after replay");
                self.inner.session.terminate();
                Err(e)
            }
            other => other,
        }
    }

    /// Obtain a credential pair and start a session
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let pair = auth::obtain_pair(self.inner.transport.as_ref(), username, password).await?;
        self.inner.session.establish(pair)
    }

    /// End the session without redirecting
    pub fn logout(&self) -> Result<()> {
        self.inner.session.logout()
    }

    pub fn session(&self) -> &SessionController {
        &self.inner.session
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub async fn refresh_state(&self) -> RefreshState {
        self.inner.coordinator.state().await
    }

    /// Requests currently parked on an in-flight refresh
    pub async fn pending_replays(&self) -> usize {
        self.inner.coordinator.queued().await
    }

    /// Refresh calls issued since the client was created
    pub fn refresh_calls(&self) -> u64 {
        self.inner.coordinator.refresh_calls()
    }
}
