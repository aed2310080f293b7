// Shared test doubles for the refresh flow tests

#![allow(dead_code)]

use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use ledger_client::auth::{
    CredentialPair, CredentialStore, Navigator, Redirect, REFRESH_PATH,
};
use ledger_client::transport::{ApiRequest, ApiResponse, Transport};
use ledger_client::{ClientError, HttpClient};

/// What the refresh endpoint does when called
#[derive(Clone, Debug)]
pub enum RefreshBehavior {
    /// Issue this access token and make it the only valid one
    Issue(&'static str),
    /// Reply with this status
    Reject(StatusCode),
    /// Fail at the transport level
    Unreachable,
}

/// One request as seen by the backend
#[derive(Clone, Debug, PartialEq)]
pub struct Seen {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
}

/// In-process stand-in for the backend
///
/// Resource paths succeed only with `JWT <valid token>`; the refresh endpoint
/// can be held closed to keep an episode in flight.
pub struct ScriptedBackend {
    valid_access: Mutex<Option<String>>,
    refresh_behavior: Mutex<RefreshBehavior>,
    always_unauthorized: Mutex<HashSet<String>>,
    refresh_gate: Semaphore,
    refresh_calls: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedBackend {
    pub fn new(valid_access: Option<&str>, refresh: RefreshBehavior) -> Arc<Self> {
        Arc::new(Self::build(valid_access, refresh, Semaphore::MAX_PERMITS))
    }

    /// Same as `new`, but refresh calls block until `open_refresh_gate`
    pub fn gated(valid_access: Option<&str>, refresh: RefreshBehavior) -> Arc<Self> {
        Arc::new(Self::build(valid_access, refresh, 0))
    }

    fn build(valid_access: Option<&str>, refresh: RefreshBehavior, permits: usize) -> Self {
        Self {
            valid_access: Mutex::new(valid_access.map(str::to_string)),
            refresh_behavior: Mutex::new(refresh),
            always_unauthorized: Mutex::new(HashSet::new()),
            refresh_gate: Semaphore::new(permits),
            refresh_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn open_refresh_gate(&self) {
        self.refresh_gate.add_permits(1024);
    }

    /// Invalidate the current access token
    pub fn expire_access(&self) {
        *self.valid_access.lock().unwrap() = None;
    }

    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        *self.refresh_behavior.lock().unwrap() = behavior;
    }

    pub fn reject_path_always(&self, path: &str) {
        self.always_unauthorized
            .lock()
            .unwrap()
            .insert(path.to_string());
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Requests for `path` (excluding refresh calls), in arrival order
    pub fn seen_for(&self, path: &str) -> Vec<Seen> {
        self.seen()
            .into_iter()
            .filter(|s| s.path == path)
            .collect()
    }

    async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let authorization = request.authorization().map(str::to_string);

        if request.path == REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.refresh_gate.acquire().await.expect("gate closed");
            let behavior = self.refresh_behavior.lock().unwrap().clone();
            return match behavior {
                RefreshBehavior::Issue(token) => {
                    *self.valid_access.lock().unwrap() = Some(token.to_string());
                    Ok(ApiResponse::new(
                        StatusCode::OK,
                        json!({ "access": token }).to_string(),
                    ))
                }
                RefreshBehavior::Reject(status) => Ok(ApiResponse::new(
                    status,
                    r#"{"detail": "Token is invalid or expired", "code": "token_not_valid"}"#,
                )),
                RefreshBehavior::Unreachable => {
                    Err(ClientError::Network("connection refused".to_string()))
                }
            };
        }

        self.seen.lock().unwrap().push(Seen {
            method: request.method.clone(),
            path: request.path.clone(),
            authorization: authorization.clone(),
        });

        let valid = self
            .valid_access
            .lock()
            .unwrap()
            .as_ref()
            .map(|token| format!("JWT {}", token));
        let forced = self
            .always_unauthorized
            .lock()
            .unwrap()
            .contains(&request.path);

        if !forced && valid.is_some() && authorization == valid {
            Ok(ApiResponse::new(
                StatusCode::OK,
                json!({ "path": request.path }).to_string(),
            ))
        } else {
            Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"detail": "Given token not valid for any token type"}"#,
            ))
        }
    }
}

impl Transport for ScriptedBackend {
    fn execute(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ClientError>> {
        Box::pin(self.handle(request))
    }
}

/// Navigator that records every redirect
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<Redirect>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<Redirect> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, redirect: Redirect) {
        self.redirects.lock().unwrap().push(redirect);
    }
}

/// Client over the scripted backend with `tok1`/`r1` stored and a live session
pub fn client_with_session(
    backend: Arc<ScriptedBackend>,
) -> (HttpClient, Arc<RecordingNavigator>) {
    let store = Arc::new(CredentialStore::in_memory());
    let navigator = Arc::new(RecordingNavigator::default());
    let client = HttpClient::new(backend, store, navigator.clone(), Duration::from_secs(5));
    client
        .session()
        .establish(CredentialPair::new("tok1", "r1"))
        .unwrap();
    (client, navigator)
}

/// Yield until `n` requests are parked on the refresh
pub async fn wait_for_pending(client: &HttpClient, n: usize) {
    while client.pending_replays().await < n {
        tokio::task::yield_now().await;
    }
}

/// Yield until the backend has received a refresh call
pub async fn wait_for_refresh_call(backend: &ScriptedBackend) {
    while backend.refresh_calls() == 0 {
        tokio::task::yield_now().await;
    }
}
