// Session lifecycle: establish on login, terminate on unrecoverable auth failure

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::credentials::CredentialStore;
use super::types::CredentialPair;
use crate::error::Result;

/// Login entry point the navigator is sent to on termination
pub const LOGIN_ROUTE: &str = "/login";

/// Navigation request issued on session termination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Replace the current history entry so back-navigation cannot
    /// return to a stale authenticated view
    pub replace: bool,
}

impl Redirect {
    pub fn to_login() -> Self {
        Self {
            to: LOGIN_ROUTE.to_string(),
            replace: true,
        }
    }
}

/// Navigation collaborator invoked when the session ends
pub trait Navigator: Send + Sync {
    fn navigate(&self, redirect: Redirect);
}

/// Navigator for headless use: records the redirect in the log
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, redirect: Redirect) {
        tracing::warn!(
            to = %redirect.to,
            replace = redirect.replace,
            "Session ended; re-authentication required"
        );
    }
}

/// Terminal-failure handler owning the authenticated flag
pub struct SessionController {
    store: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    authenticated: AtomicBool,
}

impl SessionController {
    pub fn new(store: Arc<CredentialStore>, navigator: Arc<dyn Navigator>) -> Self {
        let authenticated = AtomicBool::new(store.access_token().is_some());
        Self {
            store,
            navigator,
            authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Record a freshly issued credential pair
    pub fn establish(&self, pair: CredentialPair) -> Result<()> {
        self.store.set(pair)?;
        self.authenticated.store(true, Ordering::SeqCst);
        tracing::info!("Session established");
        Ok(())
    }

    /// Explicit logout; same cleanup as termination without a redirect
    pub fn logout(&self) -> Result<()> {
        self.authenticated.store(false, Ordering::SeqCst);
        self.store.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Clear credentials and send the user to the login entry point
    ///
    /// Safe to call repeatedly: only the call that flips the session from
    /// authenticated to terminated issues the redirect.
    pub fn terminate(&self) {
        let was_authenticated = self.authenticated.swap(false, Ordering::SeqCst);

        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear credentials: {}", e);
        }

        if was_authenticated {
            tracing::warn!("Session terminated");
            self.navigator.navigate(Redirect::to_login());
        } else {
            tracing::debug!("Session already terminated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNavigator {
        redirects: Mutex<Vec<Redirect>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, redirect: Redirect) {
            self.redirects.lock().unwrap().push(redirect);
        }
    }

    fn controller() -> (SessionController, Arc<CredentialStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(CredentialStore::in_memory());
        let navigator = Arc::new(RecordingNavigator::default());
        let session = SessionController::new(store.clone(), navigator.clone());
        (session, store, navigator)
    }

    #[test]
    fn test_establish_then_terminate() {
        let (session, store, navigator) = controller();
        assert!(!session.is_authenticated());

        session.establish(CredentialPair::new("a1", "r1")).unwrap();
        assert!(session.is_authenticated());
        assert!(store.get().is_some());

        session.terminate();
        assert!(!session.is_authenticated());
        assert!(store.get().is_none());
        assert_eq!(
            *navigator.redirects.lock().unwrap(),
            vec![Redirect {
                to: "/login".to_string(),
                replace: true
            }]
        );
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (session, store, navigator) = controller();
        session.establish(CredentialPair::new("a1", "r1")).unwrap();

        session.terminate();
        session.terminate();
        session.terminate();

        assert!(store.get().is_none());
        assert_eq!(navigator.redirects.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_logout_does_not_redirect() {
        let (session, store, navigator) = controller();
        session.establish(CredentialPair::new("a1", "r1")).unwrap();
        session.logout().unwrap();

        assert!(!session.is_authenticated());
        assert!(store.get().is_none());
        assert!(navigator.redirects.lock().unwrap().is_empty());
    }

    #[test]
    fn test_restored_credentials_count_as_authenticated() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("a1", "r1")).unwrap();
        let session = SessionController::new(store, Arc::new(LogNavigator));
        assert!(session.is_authenticated());
    }
}
