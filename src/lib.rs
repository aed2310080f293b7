// Ledger client - Library root

pub mod api;
pub mod auth;
pub mod authenticator;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod transport;

pub use error::{ClientError, Result};
pub use http_client::HttpClient;
