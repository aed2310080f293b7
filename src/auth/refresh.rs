// Credential issuance and refresh calls

use serde_json::Value;

use super::types::{
    CredentialPair, LoginRequest, RefreshRequest, RefreshResponse, RefreshedToken, Token,
};
use crate::error::{ClientError, Result};
use crate::transport::{ApiRequest, Transport};

/// Login endpoint
pub const LOGIN_PATH: &str = "/auth/jwt/create/";
/// Refresh endpoint
pub const REFRESH_PATH: &str = "/auth/jwt/refresh/";
/// Current user endpoint
pub const CURRENT_USER_PATH: &str = "/auth/users/me/";

/// Exchange username and password for a credential pair
pub async fn obtain_pair(
    transport: &dyn Transport,
    username: &str,
    password: &str,
) -> Result<CredentialPair> {
    tracing::info!(username = %username, "Requesting credential pair...");

    let body = serde_json::to_value(LoginRequest { username, password })?;
    let response = transport
        .execute(ApiRequest::post(LOGIN_PATH, body))
        .await?
        .error_for_status()?;

    let pair: CredentialPair = response.json()?;
    if pair.access.is_empty() || pair.refresh.is_empty() {
        return Err(ClientError::Decode(
            "Login response does not contain access and refresh tokens".to_string(),
        ));
    }

    tracing::info!("Credential pair issued");
    Ok(pair)
}

/// Obtain a new access token using the refresh token
pub async fn refresh_access(transport: &dyn Transport, refresh: &Token) -> Result<RefreshedToken> {
    tracing::info!("Refreshing access token...");

    let body = serde_json::to_value(RefreshRequest {
        refresh: refresh.as_str(),
    })?;
    let response = transport
        .execute(ApiRequest::post(REFRESH_PATH, body))
        .await?;

    if !response.is_success() {
        let error_text = response.text();
        tracing::error!(
            status = %response.status,
            body = %error_text,
            "Token refresh rejected"
        );

        // SimpleJWT reports {"detail": ..., "code": "token_not_valid"}
        if let Ok(error_json) = serde_json::from_str::<Value>(&error_text) {
            if let Some(code) = error_json.get("code").and_then(|v| v.as_str()) {
                tracing::error!(code = %code, "Refresh error details");
            }
        }

        return Err(ClientError::Api {
            status: response.status.as_u16(),
            message: error_text,
        });
    }

    let data: RefreshResponse = response.json()?;
    if data.access.is_empty() {
        return Err(ClientError::Decode(
            "Refresh response does not contain access token".to_string(),
        ));
    }

    let refreshed = RefreshedToken {
        access: Token::new(data.access),
        refresh: data.refresh.map(Token::new),
    };
    tracing::info!(
        access = %refreshed.access.redacted(),
        rotated = refreshed.refresh.is_some(),
        "Access token refreshed"
    );
    Ok(refreshed)
}
