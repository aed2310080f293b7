// Authentication module
// Credential storage, issuance/refresh calls and session lifecycle

mod types;
mod credentials;
mod refresh;
mod session;

pub use credentials::{CredentialStore, FileStore, KeyValueStore, MemoryStore, ACCESS_KEY, REFRESH_KEY};
pub use refresh::{obtain_pair, refresh_access, CURRENT_USER_PATH, LOGIN_PATH, REFRESH_PATH};
pub use session::{LogNavigator, Navigator, Redirect, SessionController, LOGIN_ROUTE};
pub use types::{CredentialPair, RefreshedToken, Token};
