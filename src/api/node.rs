// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Node information and maintenance actions.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::wallet::ActionResponse;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::LndConf;

#[derive(Debug, Serialize, ToSchema)]
pub struct NodeInfoResponse {
    pub alias: String,
    pub identity_pubkey: String,
    pub synced_to_chain: bool,
    pub synced_to_graph: bool,
    /// URIs other nodes can use to peer with this one.
    pub uris: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/actions/node-info",
    tag = "Node",
    responses((status = 200, body = NodeInfoResponse))
)]
pub async fn node_info(State(state): State<AppState>) -> Result<Json<NodeInfoResponse>, ApiError> {
    let info = state
        .cli
        .get_info()
        .await
        .map_err(|e| ApiError::unprocessable(format!("Error fetching node info: {e}")))?;

    let conf = LndConf::load(&state.settings.lnd_conf_path())
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let mut hosts: Vec<String> = conf
        .get_all("externalhosts")
        .into_iter()
        .map(str::to_string)
        .collect();
    if let Some(ip) = conf.get("externalip") {
        hosts.push(ip.to_string());
    }
    let uris = hosts
        .into_iter()
        .map(|h| format!("{}@{h}", info.identity_pubkey))
        .collect();

    Ok(Json(NodeInfoResponse {
        alias: info.alias,
        identity_pubkey: info.identity_pubkey,
        synced_to_chain: info.synced_to_chain,
        synced_to_graph: info.synced_to_graph,
        uris,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TowerInfoResponse {
    /// Share this URI with other nodes to offer them watchtower service.
    pub uri: String,
}

#[utoipa::path(
    get,
    path = "/v1/actions/tower-info",
    tag = "Node",
    responses((status = 200, body = TowerInfoResponse))
)]
pub async fn tower_info(State(state): State<AppState>) -> Result<Json<TowerInfoResponse>, ApiError> {
    let conf = LndConf::load(&state.settings.lnd_conf_path())
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !conf.get_bool("watchtower.active") {
        return Err(ApiError::conflict("Watchtower server must be enabled."));
    }

    let info = state
        .cli
        .tower_info()
        .await
        .map_err(|e| ApiError::unprocessable(format!("Error fetching tower info: {e}")))?;
    let uri = info
        .uris
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::unprocessable("Tower reported no URIs."))?;

    Ok(Json(TowerInfoResponse { uri }))
}

#[utoipa::path(
    post,
    path = "/v1/actions/reset-transactions",
    tag = "Node",
    responses((status = 200, body = ActionResponse))
)]
pub async fn reset_transactions(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, ApiError> {
    state
        .wallet
        .merge(|d| d.reset_wallet_transactions = true)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(ActionResponse::new(
        "Success",
        "Wallet transactions will be reset on the next startup.",
    )))
}
