// Refresh coordination
// Single-flight token refresh with a FIFO queue of blocked requests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use crate::auth::{refresh_access, CredentialPair, CredentialStore, SessionController, Token};
use crate::error::{ClientError, Result};
use crate::retry::RequestAttempt;
use crate::transport::Transport;

/// Default bound on a single refresh call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// A blocked request handed back to its caller once a token is available
#[derive(Debug)]
pub struct ReplayTicket {
    pub attempt: RequestAttempt,
    pub token: Token,
}

/// Queued request plus the handle that completes its caller
pub struct PendingReplay {
    seq: u64,
    attempt: RequestAttempt,
    completion: oneshot::Sender<Result<ReplayTicket>>,
}

/// FIFO of requests waiting on the in-flight refresh
#[derive(Default)]
pub struct WaitQueue {
    entries: VecDeque<PendingReplay>,
    next_seq: u64,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enqueue a blocked request; the receiver completes when the refresh settles
    pub fn push(&mut self, attempt: RequestAttempt) -> oneshot::Receiver<Result<ReplayTicket>> {
        let (completion, receiver) = oneshot::channel();
        self.entries.push_back(PendingReplay {
            seq: self.next_seq,
            attempt,
            completion,
        });
        self.next_seq += 1;
        receiver
    }

    /// Hand every waiter the new token, in enqueue order
    ///
    /// Returns the sequence numbers in the order they were resolved.
    pub fn resolve_all(&mut self, token: &Token) -> Vec<u64> {
        let mut order = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_front() {
            order.push(entry.seq);
            let ticket = ReplayTicket {
                attempt: entry.attempt,
                token: token.clone(),
            };
            if entry.completion.send(Ok(ticket)).is_err() {
                tracing::debug!(seq = entry.seq, "Waiter dropped before refresh settled");
            }
        }
        order
    }

    /// Fail every waiter with a session-invalidated error, in enqueue order
    pub fn reject_all(&mut self, reason: &str) -> Vec<u64> {
        let mut order = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_front() {
            order.push(entry.seq);
            let err = ClientError::SessionInvalidated(reason.to_string());
            if entry.completion.send(Err(err)).is_err() {
                tracing::debug!(seq = entry.seq, "Waiter dropped before refresh settled");
            }
        }
        order
    }
}

struct CoordinatorState {
    phase: RefreshState,
    queue: WaitQueue,
}

/// Owns the refresh state machine for one client
pub struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
    store: Arc<CredentialStore>,
    session: Arc<SessionController>,
    transport: Arc<dyn Transport>,
    refresh_timeout: Duration,
    refresh_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        session: Arc<SessionController>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                phase: RefreshState::Idle,
                queue: WaitQueue::new(),
            }),
            store,
            session,
            transport,
            refresh_timeout,
            refresh_calls: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> RefreshState {
        self.state.lock().await.phase
    }

    /// Number of requests currently waiting on the refresh
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Refresh calls issued over the coordinator's lifetime
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Block an expired request until a fresh access token is available
    ///
    /// `stale` is the token the request was sent with. If the store already
    /// holds a different token while idle, the episode that replaced it has
    /// settled and the request is released immediately. Otherwise it is
    /// queued, and the first request to arrive while idle starts the refresh.
    pub async fn await_fresh_token(
        self: &Arc<Self>,
        attempt: RequestAttempt,
        stale: Option<Token>,
    ) -> Result<ReplayTicket> {
        let receiver = {
            let mut state = self.state.lock().await;

            if state.phase == RefreshState::Idle {
                if let Some(current) = self.store.access_token() {
                    if stale.as_ref() != Some(&current) {
                        tracing::debug!("Credential already replaced, replaying without refresh");
                        return Ok(ReplayTicket {
                            attempt,
                            token: current,
                        });
                    }
                }
            }

            let receiver = state.queue.push(attempt);

            if state.phase == RefreshState::Idle {
                state.phase = RefreshState::Refreshing;
                tracing::info!("Access credential expired, starting refresh");

                // Spawned so a cancelled caller cannot strand the state machine
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    coordinator.run_refresh().await;
                });
            } else {
                tracing::debug!(queued = state.queue.len(), "Refresh in flight, request queued");
            }

            receiver
        };

        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::SessionInvalidated(
                "refresh ended without settling".to_string(),
            )),
        }
    }

    async fn run_refresh(&self) {
        let (current, generation) = self.store.snapshot();
        let outcome = self
            .refresh_once(current.map(|pair| pair.refresh).filter(|t| !t.is_empty()))
            .await;

        let mut state = self.state.lock().await;
        state.phase = RefreshState::Idle;

        match outcome {
            Ok(pair) => {
                let token = pair.access.clone();
                let applied = match self.store.set_if_current(pair, generation) {
                    Ok(applied) => applied,
                    Err(e) => {
                        tracing::warn!("Refreshed credentials not persisted: {}", e);
                        true
                    }
                };
                if applied {
                    let resolved = state.queue.resolve_all(&token);
                    tracing::info!(resumed = resolved.len(), "Refresh succeeded, replaying queued requests");
                } else {
                    tracing::warn!("Session changed during refresh, discarding refreshed credentials");
                    self.settle_superseded(&mut state.queue);
                }
            }
            Err(_) if self.store.generation() != generation => {
                self.settle_superseded(&mut state.queue);
            }
            Err(reason) => {
                tracing::error!(reason = %reason, "Refresh failed, invalidating session");
                self.session.terminate();
                let rejected = state.queue.reject_all(&reason);
                tracing::warn!(rejected = rejected.len(), "Queued requests rejected");
            }
        }
    }

    /// Settle waiters of an episode overtaken by logout, termination or a new login
    fn settle_superseded(&self, queue: &mut WaitQueue) {
        match self.store.access_token() {
            Some(token) => {
                let resolved = queue.resolve_all(&token);
                tracing::info!(resumed = resolved.len(), "Replaying queued requests with the newer session");
            }
            None => {
                let rejected = queue.reject_all("session ended during refresh");
                tracing::warn!(rejected = rejected.len(), "Queued requests rejected");
            }
        }
    }

    async fn refresh_once(
        &self,
        refresh: Option<Token>,
    ) -> std::result::Result<CredentialPair, String> {
        let Some(refresh) = refresh else {
            return Err("no refresh credential stored".to_string());
        };

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        match tokio::time::timeout(
            self.refresh_timeout,
            refresh_access(self.transport.as_ref(), &refresh),
        )
        .await
        {
            Ok(Ok(refreshed)) => Ok(refreshed.into_pair(refresh)),
            Ok(Err(e)) => Err(format!("refresh rejected: {}", e)),
            Err(_) => Err(format!(
                "refresh timed out after {}ms",
                self.refresh_timeout.as_millis()
            )),
        }
    }
}
