// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider configuration reconciler.
//!
//! Translates a submitted set of `{enabled providers, credentials}` into
//! the remote-config text and the two identifier sequences. Works on a
//! copy of the document and returns the new value; validation failures
//! surface before anything is persisted, so no partial state survives a
//! bad submission. Submitting the same enabled-set with empty credential
//! fields keeps previously stored values.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;
use utoipa::ToSchema;

use super::rclone_conf::{self, CredentialError, RcloneConf, Section};
use super::transport::is_onion_host;
use crate::store::document::StoreError;
use crate::store::{BackupDoc, EmailSettings};

pub const DEFAULT_REMOTE_PATH: &str = "lnd-backups";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("{0}")]
    Validation(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("{0}")]
    Credential(#[from] CredentialError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

fn invalid(message: &str) -> ReconcileError {
    ReconcileError::Validation(message.to_string())
}

/// Backup providers this service knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gdrive,
    Dropbox,
    Nextcloud,
    Sftp,
    Email,
}

impl Provider {
    pub fn remote_name(&self) -> &'static str {
        match self {
            Provider::Gdrive => "gdrive",
            Provider::Dropbox => "dropbox",
            Provider::Nextcloud => "nextcloud",
            Provider::Sftp => "sftp",
            Provider::Email => "email",
        }
    }

    /// The cloud providers, i.e. everything that owns a config section.
    pub const CLOUD: [Provider; 4] = [
        Provider::Gdrive,
        Provider::Dropbox,
        Provider::Nextcloud,
        Provider::Sftp,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SftpAuthKind {
    Password,
    Key,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GdriveInput {
    pub client_id: String,
    pub client_secret: String,
    /// Long-lived refresh token, pasted directly.
    pub refresh_token: String,
    /// One-time authorization code to exchange for a refresh token.
    pub auth_code: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DropboxInput {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub auth_code: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct NextcloudInput {
    pub url: String,
    pub user: String,
    pub pass: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SftpInput {
    pub host: String,
    pub user: String,
    pub port: String,
    /// Which credential to use; password and key are mutually exclusive.
    pub auth: Option<SftpAuthKind>,
    pub pass: String,
    pub private_key: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct EmailInput {
    pub from: String,
    pub to: String,
    pub smtp_server: String,
    pub smtp_port: String,
    pub smtp_user: String,
    pub smtp_pass: String,
}

/// A full backup-targets submission.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct BackupTargetsInput {
    pub providers: Vec<Provider>,
    pub gdrive: GdriveInput,
    pub dropbox: DropboxInput,
    pub nextcloud: NextcloudInput,
    pub sftp: SftpInput,
    pub email: EmailInput,
}

/// OAuth providers whose authorization codes we can exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Dropbox,
}

impl OAuthProvider {
    pub fn token_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "https://oauth2.googleapis.com/token",
            OAuthProvider::Dropbox => "https://api.dropboxapi.com/oauth2/token",
        }
    }
}

/// Exchanges a one-time authorization code for a refresh token.
///
/// The code is single-use: the call is made exactly once and its error is
/// surfaced to the caller, never retried.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<String, ReconcileError>;
}

/// Exchanger posting to the real provider token endpoints.
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    http: Client,
}

impl HttpTokenExchanger {
    pub fn new() -> Result<Self, ReconcileError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReconcileError::TokenExchange(format!("failed to build client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<String, ReconcileError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", "urn:ietf:wg:oauth:2.0:oob"),
        ];
        let response = self
            .http
            .post(provider.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| ReconcileError::TokenExchange(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReconcileError::TokenExchange(e.to_string()))?;
        if !status.is_success() {
            return Err(ReconcileError::TokenExchange(format!(
                "{status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("refresh_token")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                ReconcileError::TokenExchange(
                    "response did not contain a refresh token".to_string(),
                )
            })
    }
}

/// Non-empty trimmed input, else the previously stored value.
fn pick(new: &str, existing: Option<&str>) -> Option<String> {
    let trimmed = new.trim();
    if !trimmed.is_empty() {
        Some(trimmed.to_string())
    } else {
        existing
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Path component of the stored `provider:path` identifier.
fn stored_path(doc: &BackupDoc, provider: &str) -> Option<String> {
    let prefix = format!("{provider}:");
    doc.selected_remotes
        .iter()
        .find(|r| r.starts_with(&prefix))
        .and_then(|r| r.split_once(':'))
        .map(|(_, path)| path.to_string())
}

/// Remove every trace of a provider: section plus both sequences.
fn purge_provider(doc: &mut BackupDoc, conf: &mut RcloneConf, provider: &str) {
    conf.remove(provider);
    let prefix = format!("{provider}:");
    doc.selected_remotes.retain(|r| !r.starts_with(&prefix));
    doc.enabled_remotes.retain(|r| !r.starts_with(&prefix));
}

/// Point both sequences at `provider:path`, replacing a stale path.
fn update_remote_ids(doc: &mut BackupDoc, provider: &str, path: &str) {
    let id = format!("{provider}:{path}");
    let prefix = format!("{provider}:");
    doc.selected_remotes
        .retain(|r| !r.starts_with(&prefix) || *r == id);
    doc.enabled_remotes
        .retain(|r| !r.starts_with(&prefix) || *r == id);
    if !doc.selected_remotes.contains(&id) {
        doc.selected_remotes.push(id.clone());
    }
    if !doc.enabled_remotes.contains(&id) {
        doc.enabled_remotes.push(id);
    }
}

/// Apply a submission to the current document, returning the new one.
pub async fn reconcile(
    current: &BackupDoc,
    input: &BackupTargetsInput,
    exchanger: &dyn TokenExchanger,
    socks_proxy: &str,
) -> Result<BackupDoc, ReconcileError> {
    let mut doc = current.clone();

    if input.providers.is_empty() {
        doc.auto_backup_enabled = false;
        doc.selected_remotes.clear();
        doc.enabled_remotes.clear();
        doc.email = None;
        doc.email_enabled = false;
        doc.rclone_config = None;
        return Ok(doc);
    }

    let mut conf = RcloneConf::parse(&doc.decoded_rclone_config()?);

    // Deselected cloud providers lose their section and identifiers.
    for provider in Provider::CLOUD {
        let name = provider.remote_name();
        if conf.get(name).is_some() && !input.providers.contains(&provider) {
            purge_provider(&mut doc, &mut conf, name);
        }
    }
    if !input.providers.contains(&Provider::Email) && doc.email.is_some() {
        doc.email = None;
        doc.email_enabled = false;
    }

    for provider in &input.providers {
        match provider {
            Provider::Gdrive => {
                reconcile_oauth(
                    &mut doc,
                    &mut conf,
                    "gdrive",
                    OAuthProvider::Google,
                    &input.gdrive.client_id,
                    &input.gdrive.client_secret,
                    &input.gdrive.refresh_token,
                    &input.gdrive.auth_code,
                    &input.gdrive.path,
                    "drive",
                    Some("drive"),
                    exchanger,
                )
                .await?
            }
            Provider::Dropbox => {
                reconcile_oauth(
                    &mut doc,
                    &mut conf,
                    "dropbox",
                    OAuthProvider::Dropbox,
                    &input.dropbox.client_id,
                    &input.dropbox.client_secret,
                    &input.dropbox.refresh_token,
                    &input.dropbox.auth_code,
                    &input.dropbox.path,
                    "dropbox",
                    None,
                    exchanger,
                )
                .await?
            }
            Provider::Nextcloud => {
                reconcile_nextcloud(&mut doc, &mut conf, &input.nextcloud, socks_proxy)?
            }
            Provider::Sftp => reconcile_sftp(&mut doc, &mut conf, &input.sftp)?,
            Provider::Email => reconcile_email(&mut doc, &input.email)?,
        }
    }

    doc.set_rclone_config(&conf.render());
    doc.auto_backup_enabled = true;
    doc.prune_enabled();
    Ok(doc)
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_oauth(
    doc: &mut BackupDoc,
    conf: &mut RcloneConf,
    name: &str,
    oauth: OAuthProvider,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
    auth_code: &str,
    path: &str,
    section_type: &str,
    scope: Option<&str>,
    exchanger: &dyn TokenExchanger,
) -> Result<(), ReconcileError> {
    let existing_token = conf.get(name).and_then(|s| s.get("token")).map(str::to_string);
    let existing_client_id = conf
        .get(name)
        .and_then(|s| s.get("client_id"))
        .map(str::to_string);
    let existing_client_secret = conf
        .get(name)
        .and_then(|s| s.get("client_secret"))
        .map(str::to_string);

    let token = if !refresh_token.trim().is_empty() {
        refresh_token.trim().to_string()
    } else if !auth_code.trim().is_empty() {
        let id = pick(client_id, existing_client_id.as_deref()).unwrap_or_default();
        let secret = pick(client_secret, existing_client_secret.as_deref()).unwrap_or_default();
        exchanger
            .exchange_code(oauth, &id, &secret, auth_code.trim())
            .await?
    } else if let Some(token) = existing_token {
        token
    } else {
        return Err(ReconcileError::Validation(format!(
            "{name} requires a refresh token or a one-time authorization code"
        )));
    };

    let path = pick(path, stored_path(doc, name).as_deref())
        .unwrap_or_else(|| DEFAULT_REMOTE_PATH.to_string());

    let mut section = Section::new(name);
    section.set("type", section_type);
    if let Some(scope) = scope {
        section.set("scope", scope);
    }
    if let Some(id) = pick(client_id, existing_client_id.as_deref()) {
        section.set("client_id", id);
    }
    if let Some(secret) = pick(client_secret, existing_client_secret.as_deref()) {
        section.set("client_secret", secret);
    }
    section.set("token", token);
    conf.upsert(section);
    update_remote_ids(doc, name, &path);
    Ok(())
}

fn reconcile_nextcloud(
    doc: &mut BackupDoc,
    conf: &mut RcloneConf,
    input: &NextcloudInput,
    socks_proxy: &str,
) -> Result<(), ReconcileError> {
    let existing_url = conf
        .get("nextcloud")
        .and_then(|s| s.get("url"))
        .map(str::to_string);
    let existing_user = conf
        .get("nextcloud")
        .and_then(|s| s.get("user"))
        .map(str::to_string);
    let existing_pass = conf
        .get("nextcloud")
        .and_then(|s| s.get("pass"))
        .map(str::to_string);

    let required = || invalid("Nextcloud URL, username, and password are required");
    let url = pick(&input.url, existing_url.as_deref()).ok_or_else(required)?;
    let user = pick(&input.user, existing_user.as_deref()).ok_or_else(required)?;
    let pass = if !input.pass.trim().is_empty() {
        rclone_conf::obscure(input.pass.trim())
    } else {
        existing_pass.ok_or_else(required)?
    };

    let path = pick(&input.path, stored_path(doc, "nextcloud").as_deref())
        .unwrap_or_else(|| DEFAULT_REMOTE_PATH.to_string());

    let mut section = Section::new("nextcloud");
    section
        .set("type", "webdav")
        .set("url", url.as_str())
        .set("vendor", "nextcloud")
        .set("user", user)
        .set("pass", pass);

    let onion = Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(is_onion_host))
        .unwrap_or(false);
    if onion {
        section
            .set("http_proxy", format!("socks5h://{socks_proxy}"))
            .set("no_check_certificate", "true");
    }

    conf.upsert(section);
    update_remote_ids(doc, "nextcloud", &path);
    Ok(())
}

fn reconcile_sftp(
    doc: &mut BackupDoc,
    conf: &mut RcloneConf,
    input: &SftpInput,
) -> Result<(), ReconcileError> {
    let existing_host = conf.get("sftp").and_then(|s| s.get("host")).map(str::to_string);
    let existing_user = conf.get("sftp").and_then(|s| s.get("user")).map(str::to_string);
    let existing_port = conf.get("sftp").and_then(|s| s.get("port")).map(str::to_string);
    let existing_pass = conf.get("sftp").and_then(|s| s.get("pass")).map(str::to_string);
    let existing_key = conf
        .get("sftp")
        .and_then(|s| s.get("key_pem"))
        .map(str::to_string);

    let host = pick(&input.host, existing_host.as_deref())
        .ok_or_else(|| invalid("SFTP host and username are required"))?;
    let user = pick(&input.user, existing_user.as_deref())
        .ok_or_else(|| invalid("SFTP host and username are required"))?;
    let port = pick(&input.port, existing_port.as_deref()).unwrap_or_else(|| "22".to_string());

    // Password and key are mutually exclusive; the submission selects one,
    // or inherits the mode already configured.
    let auth = input.auth.or_else(|| {
        if existing_key.is_some() {
            Some(SftpAuthKind::Key)
        } else if existing_pass.is_some() {
            Some(SftpAuthKind::Password)
        } else {
            None
        }
    });

    let mut section = Section::new("sftp");
    section
        .set("type", "sftp")
        .set("host", host)
        .set("user", user)
        .set("port", port);

    match auth {
        Some(SftpAuthKind::Password) => {
            let pass = if !input.pass.trim().is_empty() {
                rclone_conf::obscure(input.pass.trim())
            } else {
                existing_pass.ok_or_else(|| invalid("SFTP password is required"))?
            };
            section.set("pass", pass);
        }
        Some(SftpAuthKind::Key) => {
            let key = if !input.private_key.trim().is_empty() {
                rclone_conf::normalize_private_key(&input.private_key)?.replace('\n', "\\n")
            } else {
                existing_key.ok_or_else(|| invalid("SFTP private key is required"))?
            };
            section.set("key_pem", key);
        }
        None => {
            return Err(invalid(
                "Select password or key authentication for SFTP",
            ))
        }
    }

    let path = pick(&input.path, stored_path(doc, "sftp").as_deref())
        .unwrap_or_else(|| DEFAULT_REMOTE_PATH.to_string());
    conf.upsert(section);
    update_remote_ids(doc, "sftp", &path);
    Ok(())
}

fn reconcile_email(doc: &mut BackupDoc, input: &EmailInput) -> Result<(), ReconcileError> {
    let existing = doc.email.clone();
    let required = || invalid("Email from, to, SMTP user, and password are required");

    let from = pick(&input.from, existing.as_ref().map(|e| e.from.as_str())).ok_or_else(required)?;
    let to = pick(&input.to, existing.as_ref().map(|e| e.to.as_str())).ok_or_else(required)?;
    let server = pick(
        &input.smtp_server,
        existing.as_ref().map(|e| e.smtp_server.as_str()),
    )
    .unwrap_or_else(|| "smtp.gmail.com".to_string());
    let port_text = pick(
        &input.smtp_port,
        existing.as_ref().map(|e| e.smtp_port.to_string()).as_deref(),
    )
    .unwrap_or_else(|| "465".to_string());
    let port: u16 = port_text
        .parse()
        .map_err(|_| invalid("Email SMTP port must be a number"))?;
    let user = pick(&input.smtp_user, existing.as_ref().map(|e| e.smtp_user.as_str()))
        .ok_or_else(required)?;
    let pass = pick(&input.smtp_pass, existing.as_ref().map(|e| e.smtp_pass.as_str()))
        .ok_or_else(required)?;

    doc.email = Some(EmailSettings {
        from,
        to,
        smtp_server: server,
        smtp_port: port,
        smtp_user: user,
        smtp_pass: pass,
    });
    doc.email_enabled = true;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-back view (secrets never leave the store)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct SftpView {
    pub host: String,
    pub user: String,
    pub port: String,
    pub auth: Option<SftpAuthKind>,
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NextcloudView {
    pub url: String,
    pub user: String,
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OAuthView {
    pub client_id: Option<String>,
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailView {
    pub from: String,
    pub to: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
}

/// Current configuration with every secret field omitted.
#[derive(Debug, Serialize, ToSchema)]
pub struct BackupTargetsView {
    pub providers: Vec<Provider>,
    pub auto_backup_enabled: bool,
    pub selected_remotes: Vec<String>,
    pub enabled_remotes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdrive: Option<OAuthView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropbox: Option<OAuthView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nextcloud: Option<NextcloudView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sftp: Option<SftpView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailView>,
}

pub fn current_view(doc: &BackupDoc) -> Result<BackupTargetsView, ReconcileError> {
    let conf = RcloneConf::parse(&doc.decoded_rclone_config()?);
    let path_of = |name: &str| {
        stored_path(doc, name).unwrap_or_else(|| DEFAULT_REMOTE_PATH.to_string())
    };

    let mut providers = Vec::new();
    for provider in Provider::CLOUD {
        if conf.get(provider.remote_name()).is_some() {
            providers.push(provider);
        }
    }
    if doc.email.is_some() {
        providers.push(Provider::Email);
    }

    let oauth_view = |name: &str| {
        conf.get(name).map(|s| OAuthView {
            client_id: s.get("client_id").map(str::to_string),
            path: path_of(name),
        })
    };

    Ok(BackupTargetsView {
        providers,
        auto_backup_enabled: doc.auto_backup_enabled,
        selected_remotes: doc.selected_remotes.clone(),
        enabled_remotes: doc.enabled_remotes.clone(),
        gdrive: oauth_view("gdrive"),
        dropbox: oauth_view("dropbox"),
        nextcloud: conf.get("nextcloud").map(|s| NextcloudView {
            url: s.get("url").unwrap_or_default().to_string(),
            user: s.get("user").unwrap_or_default().to_string(),
            path: path_of("nextcloud"),
        }),
        sftp: conf.get("sftp").map(|s| SftpView {
            host: s.get("host").unwrap_or_default().to_string(),
            user: s.get("user").unwrap_or_default().to_string(),
            port: s.get("port").unwrap_or("22").to_string(),
            auth: if s.get("key_pem").is_some() {
                Some(SftpAuthKind::Key)
            } else if s.get("pass").is_some() {
                Some(SftpAuthKind::Password)
            } else {
                None
            },
            path: path_of("sftp"),
        }),
        email: doc.email.as_ref().map(|e| EmailView {
            from: e.from.clone(),
            to: e.to.clone(),
            smtp_server: e.smtp_server.clone(),
            smtp_port: e.smtp_port,
            smtp_user: e.smtp_user.clone(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockExchanger {
        calls: AtomicU32,
        token: String,
    }

    impl MockExchanger {
        fn new(token: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                token: token.to_string(),
            }
        }
    }

    #[async_trait]
    impl TokenExchanger for MockExchanger {
        async fn exchange_code(
            &self,
            _provider: OAuthProvider,
            _client_id: &str,
            _client_secret: &str,
            _code: &str,
        ) -> Result<String, ReconcileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.clone())
        }
    }

    const PROXY: &str = "127.0.0.1:9050";

    fn sftp_submission() -> BackupTargetsInput {
        BackupTargetsInput {
            providers: vec![Provider::Sftp],
            sftp: SftpInput {
                host: "1.2.3.4".into(),
                user: "bob".into(),
                pass: "secret".into(),
                auth: Some(SftpAuthKind::Password),
                path: "lnd-backups".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sftp_round_trip_obscures_password() {
        let exchanger = MockExchanger::new("unused");
        let doc = reconcile(&BackupDoc::default(), &sftp_submission(), &exchanger, PROXY)
            .await
            .unwrap();

        assert!(doc.auto_backup_enabled);
        assert!(doc.selected_remotes.contains(&"sftp:lnd-backups".to_string()));
        assert!(doc.enabled_remotes.contains(&"sftp:lnd-backups".to_string()));

        let conf = RcloneConf::parse(&doc.decoded_rclone_config().unwrap());
        let section = conf.get("sftp").unwrap();
        assert_eq!(section.get("host"), Some("1.2.3.4"));
        assert_eq!(section.get("user"), Some("bob"));
        let stored_pass = section.get("pass").unwrap();
        assert_ne!(stored_pass, "secret");
        assert_eq!(rclone_conf::reveal(stored_pass).unwrap(), "secret");
    }

    #[tokio::test]
    async fn noop_resubmission_keeps_stored_credentials() {
        let exchanger = MockExchanger::new("unused");
        let first = reconcile(&BackupDoc::default(), &sftp_submission(), &exchanger, PROXY)
            .await
            .unwrap();

        // Same enabled-set, all credential fields empty.
        let noop = BackupTargetsInput {
            providers: vec![Provider::Sftp],
            ..Default::default()
        };
        let second = reconcile(&first, &noop, &exchanger, PROXY).await.unwrap();

        assert_eq!(
            first.decoded_rclone_config().unwrap(),
            second.decoded_rclone_config().unwrap()
        );
        assert_eq!(first.selected_remotes, second.selected_remotes);
        assert_eq!(first.enabled_remotes, second.enabled_remotes);
    }

    #[tokio::test]
    async fn deselection_purges_section_and_identifiers() {
        let exchanger = MockExchanger::new("tok-1");
        let both = BackupTargetsInput {
            providers: vec![Provider::Sftp, Provider::Gdrive],
            sftp: sftp_submission().sftp,
            gdrive: GdriveInput {
                refresh_token: "tok-direct".into(),
                path: "lnd-backups".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let configured = reconcile(&BackupDoc::default(), &both, &exchanger, PROXY)
            .await
            .unwrap();
        assert_eq!(configured.selected_remotes.len(), 2);

        let only_gdrive = BackupTargetsInput {
            providers: vec![Provider::Gdrive],
            ..Default::default()
        };
        let after = reconcile(&configured, &only_gdrive, &exchanger, PROXY)
            .await
            .unwrap();

        let blob = after.decoded_rclone_config().unwrap();
        assert!(!blob.contains("[sftp]"));
        assert!(blob.contains("[gdrive]"));
        assert!(!after.selected_remotes.iter().any(|r| r.starts_with("sftp:")));
        assert!(!after.enabled_remotes.iter().any(|r| r.starts_with("sftp:")));
    }

    #[tokio::test]
    async fn oauth_code_is_exchanged_once_and_token_reused() {
        let exchanger = MockExchanger::new("refresh-abc");
        let with_code = BackupTargetsInput {
            providers: vec![Provider::Gdrive],
            gdrive: GdriveInput {
                client_id: "cid".into(),
                client_secret: "cs".into(),
                auth_code: "one-time-code".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = reconcile(&BackupDoc::default(), &with_code, &exchanger, PROXY)
            .await
            .unwrap();
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);

        let conf = RcloneConf::parse(&doc.decoded_rclone_config().unwrap());
        assert_eq!(conf.get("gdrive").unwrap().get("token"), Some("refresh-abc"));

        // Empty resubmission reuses the stored token without exchanging.
        let noop = BackupTargetsInput {
            providers: vec![Provider::Gdrive],
            ..Default::default()
        };
        let again = reconcile(&doc, &noop, &exchanger, PROXY).await.unwrap();
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
        let conf = RcloneConf::parse(&again.decoded_rclone_config().unwrap());
        assert_eq!(conf.get("gdrive").unwrap().get("token"), Some("refresh-abc"));
    }

    #[tokio::test]
    async fn oauth_with_no_credentials_is_rejected() {
        let exchanger = MockExchanger::new("unused");
        let input = BackupTargetsInput {
            providers: vec![Provider::Dropbox],
            ..Default::default()
        };
        let result = reconcile(&BackupDoc::default(), &input, &exchanger, PROXY).await;
        assert!(matches!(result, Err(ReconcileError::Validation(_))));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn onion_webdav_gets_proxy_directives() {
        let exchanger = MockExchanger::new("unused");
        let input = BackupTargetsInput {
            providers: vec![Provider::Nextcloud],
            nextcloud: NextcloudInput {
                url: "https://abc123xyz.onion/remote.php/dav/files/bob/".into(),
                user: "bob".into(),
                pass: "pw".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = reconcile(&BackupDoc::default(), &input, &exchanger, PROXY)
            .await
            .unwrap();

        let conf = RcloneConf::parse(&doc.decoded_rclone_config().unwrap());
        let section = conf.get("nextcloud").unwrap();
        assert_eq!(section.get("http_proxy"), Some("socks5h://127.0.0.1:9050"));
        assert_eq!(section.get("no_check_certificate"), Some("true"));
    }

    #[tokio::test]
    async fn clearnet_webdav_has_no_proxy_directives() {
        let exchanger = MockExchanger::new("unused");
        let input = BackupTargetsInput {
            providers: vec![Provider::Nextcloud],
            nextcloud: NextcloudInput {
                url: "https://cloud.example.com/remote.php/dav/files/bob/".into(),
                user: "bob".into(),
                pass: "pw".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = reconcile(&BackupDoc::default(), &input, &exchanger, PROXY)
            .await
            .unwrap();

        let conf = RcloneConf::parse(&doc.decoded_rclone_config().unwrap());
        assert!(conf.get("nextcloud").unwrap().get("http_proxy").is_none());
    }

    #[tokio::test]
    async fn sftp_without_auth_selection_is_rejected() {
        let exchanger = MockExchanger::new("unused");
        let input = BackupTargetsInput {
            providers: vec![Provider::Sftp],
            sftp: SftpInput {
                host: "1.2.3.4".into(),
                user: "bob".into(),
                pass: "secret".into(),
                auth: None,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = reconcile(&BackupDoc::default(), &input, &exchanger, PROXY).await;
        assert!(matches!(result, Err(ReconcileError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_provider_set_disables_everything() {
        let exchanger = MockExchanger::new("unused");
        let configured = reconcile(&BackupDoc::default(), &sftp_submission(), &exchanger, PROXY)
            .await
            .unwrap();

        let cleared = reconcile(&configured, &BackupTargetsInput::default(), &exchanger, PROXY)
            .await
            .unwrap();
        assert!(!cleared.auto_backup_enabled);
        assert!(cleared.selected_remotes.is_empty());
        assert!(cleared.enabled_remotes.is_empty());
        assert!(cleared.rclone_config.is_none());
        assert!(cleared.email.is_none());
    }

    #[tokio::test]
    async fn email_requires_core_fields() {
        let exchanger = MockExchanger::new("unused");
        let input = BackupTargetsInput {
            providers: vec![Provider::Email],
            email: EmailInput {
                from: "node@example.com".into(),
                to: "me@example.com".into(),
                smtp_user: "node@example.com".into(),
                // password missing
                ..Default::default()
            },
            ..Default::default()
        };
        let result = reconcile(&BackupDoc::default(), &input, &exchanger, PROXY).await;
        assert!(matches!(result, Err(ReconcileError::Validation(_))));
    }

    #[tokio::test]
    async fn view_never_contains_secrets() {
        let exchanger = MockExchanger::new("unused");
        let doc = reconcile(&BackupDoc::default(), &sftp_submission(), &exchanger, PROXY)
            .await
            .unwrap();

        let view = current_view(&doc).unwrap();
        let rendered = serde_json::to_string(&view).unwrap();
        assert!(!rendered.contains("secret"));
        assert_eq!(view.providers, vec![Provider::Sftp]);
        assert_eq!(view.sftp.unwrap().auth, Some(SftpAuthKind::Password));
    }
}
