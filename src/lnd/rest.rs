// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client for the wrapped daemon's local REST API.
//!
//! LND serves this API over HTTPS with a self-signed certificate on a
//! fixed local port, so certificate verification is disabled for this
//! client only. Wallet endpoints are unauthenticated by design: they are
//! only usable while the wallet is locked or uninitialized.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("daemon rejected the call: {0}")]
    Api(String),

    #[error("response was invalid: {0}")]
    InvalidResponse(String),
}

/// The wallet-facing slice of the daemon's REST API.
#[async_trait]
pub trait WalletRpc: Send + Sync {
    /// `GET /v1/genseed` - fresh aezeed mnemonic; fails until RPC is up.
    async fn gen_seed(&self) -> Result<Vec<String>, RpcError>;

    /// `POST /v1/initwallet` - one-time wallet creation.
    async fn init_wallet(&self, password_b64: &str, mnemonic: &[String]) -> Result<(), RpcError>;

    /// `POST /v1/unlockwallet` - success is an empty-object payload.
    async fn unlock_wallet(
        &self,
        password_b64: &str,
        recovery_window: Option<u32>,
    ) -> Result<(), RpcError>;

    /// `POST /v1/changepassword` - success carries a fresh admin macaroon.
    async fn change_password(&self, current_b64: &str, new_b64: &str) -> Result<(), RpcError>;
}

#[derive(Debug, Clone)]
pub struct LndRestClient {
    base_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct GenSeedResponse {
    cipher_seed_mnemonic: Vec<String>,
}

impl LndRestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RpcError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RpcError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<String, RpcError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Request(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| RpcError::Request(e.to_string()))?;
        Ok(text)
    }

    /// LND reports errors as 200-status JSON bodies with `error`/`message`
    /// fields as often as it uses HTTP status codes; check both.
    fn check_empty_success(body: &str) -> Result<(), RpcError> {
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return Ok(());
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                if let Some(message) = value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(Value::as_str)
                {
                    Err(RpcError::Api(message.to_string()))
                } else if value.as_object().is_some_and(|o| o.is_empty()) {
                    Ok(())
                } else {
                    Err(RpcError::InvalidResponse(truncate(trimmed, 200)))
                }
            }
            Err(_) => Err(RpcError::InvalidResponse(truncate(trimmed, 200))),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[async_trait]
impl WalletRpc for LndRestClient {
    async fn gen_seed(&self) -> Result<Vec<String>, RpcError> {
        let url = format!("{}/v1/genseed", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RpcError::Request(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RpcError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(RpcError::Api(truncate(&text, 200)));
        }
        let parsed: GenSeedResponse = serde_json::from_str(&text)
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
        if parsed.cipher_seed_mnemonic.is_empty() {
            return Err(RpcError::InvalidResponse(
                "empty cipher seed mnemonic".to_string(),
            ));
        }
        Ok(parsed.cipher_seed_mnemonic)
    }

    async fn init_wallet(&self, password_b64: &str, mnemonic: &[String]) -> Result<(), RpcError> {
        let body = self
            .post(
                "/v1/initwallet",
                json!({
                    "wallet_password": password_b64,
                    "cipher_seed_mnemonic": mnemonic,
                }),
            )
            .await?;
        // initwallet answers with an admin macaroon on success.
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(value) if value.get("admin_macaroon").is_some() => Ok(()),
            _ => Self::check_empty_success(&body),
        }
    }

    async fn unlock_wallet(
        &self,
        password_b64: &str,
        recovery_window: Option<u32>,
    ) -> Result<(), RpcError> {
        let mut payload = json!({ "wallet_password": password_b64 });
        if let Some(window) = recovery_window {
            payload["recovery_window"] = json!(window);
        }
        let body = self.post("/v1/unlockwallet", payload).await?;
        Self::check_empty_success(&body)
    }

    async fn change_password(&self, current_b64: &str, new_b64: &str) -> Result<(), RpcError> {
        let body = self
            .post(
                "/v1/changepassword",
                json!({
                    "current_password": current_b64,
                    "new_password": new_b64,
                    "stateless_init": false,
                    "new_macaroon_root_key": false,
                }),
            )
            .await?;
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(value) if value.get("admin_macaroon").is_some() => Ok(()),
            _ => Self::check_empty_success(&body),
        }
    }
}
