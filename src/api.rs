// Typed access to the ledger collections
// Every call goes through the shared authenticated client

use reqwest::Method;
use serde_json::Value;
use std::fmt;

use crate::auth::CURRENT_USER_PATH;
use crate::error::Result;
use crate::http_client::HttpClient;
use crate::transport::ApiRequest;

/// Current user's profile
pub const PROFILE_PATH: &str = "/user/profile/me/";
/// Partial update of the current user's profile
pub const PROFILE_UPDATE_PATH: &str = "/user/profile/update_profile/";

/// Backend collections under `/history/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Resource {
    Party,
    ServiceType,
    WorkRate,
    Record,
    Payment,
    Allocation,
    AdvanceLedger,
    AuditLog,
}

impl Resource {
    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Party => "party",
            Resource::ServiceType => "service-type",
            Resource::WorkRate => "work-rate",
            Resource::Record => "record",
            Resource::Payment => "payment",
            Resource::Allocation => "allocation",
            Resource::AdvanceLedger => "advance-ledger",
            Resource::AuditLog => "audit-log",
        }
    }

    pub fn collection_path(&self) -> String {
        format!("/history/{}/", self.segment())
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("/history/{}/{}/", self.segment(), id.trim_matches('/'))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Parse `key=value` filter arguments
pub fn parse_filter(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// CRUD operations over the ledger collections
#[derive(Clone)]
pub struct LedgerApi {
    client: HttpClient,
}

impl LedgerApi {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    async fn call(&self, request: ApiRequest) -> Result<Value> {
        let response = self.client.send(request).await?.error_for_status()?;
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }

    pub async fn current_user(&self) -> Result<Value> {
        self.call(ApiRequest::get(CURRENT_USER_PATH)).await
    }

    /// Profile fields (name, email, number, address) of the signed-in user
    pub async fn profile(&self) -> Result<Value> {
        self.call(ApiRequest::get(PROFILE_PATH)).await
    }

    /// Returns the updated profile
    pub async fn update_profile(&self, body: Value) -> Result<Value> {
        self.call(ApiRequest::new(Method::PATCH, PROFILE_UPDATE_PATH).json(body))
            .await
    }

    pub async fn list(&self, resource: Resource, filters: &[(String, String)]) -> Result<Value> {
        let mut request = ApiRequest::get(resource.collection_path());
        for (key, value) in filters {
            request = request.query(key.as_str(), value.as_str());
        }
        self.call(request).await
    }

    pub async fn get(&self, resource: Resource, id: &str) -> Result<Value> {
        self.call(ApiRequest::get(resource.item_path(id))).await
    }

    pub async fn create(&self, resource: Resource, body: Value) -> Result<Value> {
        self.call(ApiRequest::post(resource.collection_path(), body))
            .await
    }

    /// Full replacement (PUT)
    pub async fn update(&self, resource: Resource, id: &str, body: Value) -> Result<Value> {
        self.call(ApiRequest::new(Method::PUT, resource.item_path(id)).json(body))
            .await
    }

    pub async fn patch(&self, resource: Resource, id: &str, body: Value) -> Result<Value> {
        self.call(ApiRequest::new(Method::PATCH, resource.item_path(id)).json(body))
            .await
    }

    pub async fn delete(&self, resource: Resource, id: &str) -> Result<()> {
        self.call(ApiRequest::new(Method::DELETE, resource.item_path(id)))
            .await
            .map(|_| ())
    }
}
