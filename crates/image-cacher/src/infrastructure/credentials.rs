//! OAuth2 client-credentials exchange for the API server bearer token.

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::config::TokenExchange;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Token request to {url} failed")]
    RequestFailed { url: String },
    #[error("Token endpoint {url} answered with status {status}")]
    Rejected { url: String, status: u16 },
    #[error("Token endpoint {url} returned no access token")]
    MissingToken { url: String },
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchanges the service account's client credentials for an access token
/// at `<provider>/token`.
///
/// # Errors
///
/// - [`CredentialError::RequestFailed`] if the endpoint cannot be reached or
///   its body is not JSON
/// - [`CredentialError::Rejected`] on a non-success status
/// - [`CredentialError::MissingToken`] if the body carries no token
pub async fn exchange_token(
    http: &reqwest::Client,
    exchange: &TokenExchange,
) -> Result<String, Report<CredentialError>> {
    let url = format!("{}/token", exchange.provider_url.trim_end_matches('/'));
    debug!(client_id = %exchange.client_id, "Requesting access token from {url}");

    let response = http
        .post(&url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", exchange.client_id.as_str()),
            ("client_secret", exchange.client_secret.as_str()),
        ])
        .send()
        .await
        .change_context_lazy(|| CredentialError::RequestFailed { url: url.clone() })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Report::new(CredentialError::Rejected {
            url,
            status: status.as_u16(),
        })
        .attach_printable(body));
    }

    let body: TokenResponse = response
        .json()
        .await
        .change_context_lazy(|| CredentialError::RequestFailed { url: url.clone() })?;

    match body.access_token.filter(|t| !t.is_empty()) {
        Some(token) => {
            info!("Obtained access token for client {}", exchange.client_id);
            Ok(token)
        }
        None => Err(Report::new(CredentialError::MissingToken { url })),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Form;
    use axum::Json;
    use axum::Router;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        let authorized = form.get("grant_type").map(String::as_str) == Some("client_credentials")
            && form.get("client_id").map(String::as_str) == Some("cacher")
            && form.get("client_secret").map(String::as_str) == Some("s3cr3t");
        if authorized {
            (
                StatusCode::OK,
                Json(serde_json::json!({ "access_token": "abc123", "token_type": "bearer" })),
            )
        } else {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid_client" })),
            )
        }
    }

    async fn tokenless_endpoint() -> impl IntoResponse {
        Json(serde_json::json!({ "token_type": "bearer" }))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}/auth/")
    }

    fn exchange(provider_url: String, secret: &str) -> TokenExchange {
        TokenExchange {
            client_id: "cacher".to_string(),
            client_secret: secret.to_string(),
            provider_url,
        }
    }

    #[test(tokio::test)]
    async fn returns_access_token() {
        let url = serve(Router::new().route("/auth/token", post(token_endpoint))).await;

        let token = exchange_token(&reqwest::Client::new(), &exchange(url, "s3cr3t"))
            .await
            .expect("token");
        assert_eq!(token, "abc123");
    }

    #[test(tokio::test)]
    async fn wrong_secret_is_rejected() {
        let url = serve(Router::new().route("/auth/token", post(token_endpoint))).await;

        let report = exchange_token(&reqwest::Client::new(), &exchange(url.clone(), "nope"))
            .await
            .expect_err("must be rejected");
        assert_eq!(
            report.current_context(),
            &CredentialError::Rejected {
                url: format!("{}token", url),
                status: 401
            }
        );
    }

    #[test(tokio::test)]
    async fn missing_token_is_an_error() {
        let url = serve(Router::new().route("/auth/token", post(tokenless_endpoint))).await;

        let report = exchange_token(&reqwest::Client::new(), &exchange(url, "s3cr3t"))
            .await
            .expect_err("no token in body");
        assert!(matches!(
            report.current_context(),
            CredentialError::MissingToken { .. }
        ));
    }

    #[test(tokio::test)]
    async fn unreachable_provider() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let report = exchange_token(
            &reqwest::Client::new(),
            &exchange(format!("http://{addr}"), "s3cr3t"),
        )
        .await
        .expect_err("nothing listens there");
        assert!(matches!(
            report.current_context(),
            CredentialError::RequestFailed { .. }
        ));
    }
}
