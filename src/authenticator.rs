// Request decoration with the current access token

use reqwest::header::HeaderValue;
use std::sync::Arc;

use crate::auth::{CredentialStore, Token};
use crate::transport::ApiRequest;

/// Authorization scheme expected by the backend
pub const AUTH_SCHEME: &str = "JWT";

/// Attaches `Authorization: JWT <access>` to outgoing requests
#[derive(Clone)]
pub struct RequestAuthenticator {
    store: Arc<CredentialStore>,
}

impl RequestAuthenticator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Decorate with the stored access token
    ///
    /// Returns the token that was attached, or `None` when the request goes
    /// out unauthenticated.
    pub fn authenticate(&self, request: &mut ApiRequest) -> Option<Token> {
        request.clear_authorization();
        let token = self.store.access_token()?;
        self.stamp(request, &token).then_some(token)
    }

    /// Attach a specific token, replacing any existing Authorization header
    pub fn stamp(&self, request: &mut ApiRequest, token: &Token) -> bool {
        match HeaderValue::from_str(&format!("{} {}", AUTH_SCHEME, token.as_str())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.set_authorization(value);
                true
            }
            Err(_) => {
                tracing::warn!("Access token contains invalid header characters; sending unauthenticated");
                request.clear_authorization();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialPair;
    use reqwest::header::AUTHORIZATION;

    #[test]
    fn test_attaches_stored_token() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("tok1", "r1")).unwrap();
        let authenticator = RequestAuthenticator::new(store);

        let mut request = ApiRequest::get("/history/party/");
        let used = authenticator.authenticate(&mut request);

        assert_eq!(used, Some(Token::new("tok1")));
        assert_eq!(request.authorization(), Some("JWT tok1"));
    }

    #[test]
    fn test_leaves_request_unauthenticated_without_token() {
        let authenticator = RequestAuthenticator::new(Arc::new(CredentialStore::in_memory()));

        let mut request = ApiRequest::get("/history/party/");
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("JWT stale"));

        assert!(authenticator.authenticate(&mut request).is_none());
        assert!(request.authorization().is_none());
    }

    #[test]
    fn test_stamp_replaces_existing_header() {
        let authenticator = RequestAuthenticator::new(Arc::new(CredentialStore::in_memory()));
        let mut request = ApiRequest::get("/history/record/");
        assert!(authenticator.stamp(&mut request, &Token::new("tok1")));
        assert!(authenticator.stamp(&mut request, &Token::new("tok2")));
        assert_eq!(request.authorization(), Some("JWT tok2"));
        assert_eq!(request.headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_invalid_token_is_not_attached() {
        let authenticator = RequestAuthenticator::new(Arc::new(CredentialStore::in_memory()));
        let mut request = ApiRequest::get("/history/record/");
        assert!(!authenticator.stamp(&mut request, &Token::new("bad\ntoken")));
        assert!(request.authorization().is_none());
    }
}
