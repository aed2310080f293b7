// One-shot replay of requests blocked on an expired credential

use std::sync::Arc;

use crate::auth::Token;
use crate::authenticator::RequestAuthenticator;
use crate::error::{ClientError, Result};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Maximum refresh-and-replay cycles per logical request
pub const MAX_REPLAYS: u32 = 1;

/// Immutable request wrapper carrying its replay count
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    request: ApiRequest,
    retry_count: u32,
}

impl RequestAttempt {
    /// First attempt of a logical request; any caller-supplied Authorization is dropped
    pub fn first(mut request: ApiRequest) -> Self {
        request.clear_authorization();
        Self {
            request,
            retry_count: 0,
        }
    }

    /// Fresh attempt for the replay
    pub fn next(&self) -> Self {
        let mut request = self.request.clone();
        request.clear_authorization();
        Self {
            request,
            retry_count: self.retry_count + 1,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn already_retried(&self) -> bool {
        self.retry_count >= MAX_REPLAYS
    }

    fn exhausted(&self) -> ClientError {
        ClientError::AuthenticationExhausted {
            method: self.request.method.to_string(),
            path: self.request.path.clone(),
        }
    }
}

/// Classify a response against the attempt that produced it
///
/// 401 on a first attempt is `CredentialExpired` (recoverable); 401 on a
/// replay is `AuthenticationExhausted`. Every other status passes through.
pub fn check_expiry(attempt: &RequestAttempt, response: ApiResponse) -> Result<ApiResponse> {
    if !response.is_credential_expired() {
        return Ok(response);
    }
    if attempt.already_retried() {
        Err(attempt.exhausted())
    } else {
        Err(ClientError::CredentialExpired)
    }
}

/// Resubmits a blocked request with a freshly issued token
#[derive(Clone)]
pub struct RetryDispatcher {
    transport: Arc<dyn Transport>,
    authenticator: RequestAuthenticator,
}

impl RetryDispatcher {
    pub fn new(transport: Arc<dyn Transport>, authenticator: RequestAuthenticator) -> Self {
        Self {
            transport,
            authenticator,
        }
    }

    pub async fn replay(&self, attempt: &RequestAttempt, token: &Token) -> Result<ApiResponse> {
        let retry = attempt.next();
        let mut request = retry.request().clone();
        self.authenticator.stamp(&mut request, token);

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            attempt = retry.retry_count() + 1,
            "Replaying request with refreshed credential"
        );

        let response = self.transport.execute(request).await?;
        check_expiry(&retry, response).map_err(|e| {
            tracing::error!(error = %e, "Replayed request rejected again");
            e
        })
    }
}
