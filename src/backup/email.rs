// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email branch of the backup fan-out.
//!
//! The artifact is sent as an attachment through an external mail command
//! fed a generated config file. The SMTP host is resolved up front with a
//! bounded retry so an unreachable resolver fails the branch quickly
//! instead of stalling inside the mail tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::lifecycle::retry::{Retry, RetryError};
use crate::store::EmailSettings;

/// DNS resolution attempts before the send is skipped.
const DNS_ATTEMPTS: u32 = 5;
const DNS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email backup requires at least one recipient")]
    MissingRecipients,

    #[error("email backup requires an SMTP password")]
    MissingPassword,

    #[error("could not resolve SMTP host {host}: {message}")]
    Dns { host: String, message: String },

    #[error("mail command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// TLS mode derived from the configured port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Port 465 and friends: TLS from the first byte.
    Implicit,
    /// Port 587: plain connection upgraded via STARTTLS.
    StartTls,
}

impl SmtpTls {
    pub fn for_port(port: u16) -> Self {
        if port == 587 {
            SmtpTls::StartTls
        } else {
            SmtpTls::Implicit
        }
    }

    pub fn url_scheme(&self) -> &'static str {
        match self {
            SmtpTls::Implicit => "smtps",
            SmtpTls::StartTls => "smtp",
        }
    }
}

/// Sends the backup artifact to the configured recipients.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_backup(
        &self,
        settings: &EmailSettings,
        attachment: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MailError>;
}

/// Mailer invoking an external mutt-compatible command.
#[derive(Debug, Clone)]
pub struct CommandMailer {
    bin: String,
    config_dir: PathBuf,
}

impl CommandMailer {
    pub fn new(bin: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            config_dir: config_dir.into(),
        }
    }

    fn render_config(settings: &EmailSettings, tls: SmtpTls) -> String {
        format!(
            "set from = \"{from}\"\n\
             set realname = \"LND Backup\"\n\
             set smtp_url = \"{scheme}://{user}@{server}:{port}/\"\n\
             set smtp_pass = \"{pass}\"\n\
             set ssl_starttls = {starttls}\n\
             set ssl_force_tls = yes\n",
            from = settings.from,
            scheme = tls.url_scheme(),
            user = settings.smtp_user,
            server = settings.smtp_server,
            port = settings.smtp_port,
            pass = settings.smtp_pass,
            starttls = if tls == SmtpTls::StartTls { "yes" } else { "no" },
        )
    }
}

#[async_trait]
impl Mailer for CommandMailer {
    async fn send_backup(
        &self,
        settings: &EmailSettings,
        attachment: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MailError> {
        let recipients = settings.recipients();
        if recipients.is_empty() {
            return Err(MailError::MissingRecipients);
        }
        if settings.smtp_pass.is_empty() {
            return Err(MailError::MissingPassword);
        }

        // Resolve before sending; the mail tool's own resolver failure
        // modes are slow and opaque.
        let host = settings.smtp_server.clone();
        let port = settings.smtp_port;
        let retry = Retry::new().max_attempts(DNS_ATTEMPTS).interval(DNS_INTERVAL);
        retry
            .run(cancel, || {
                let host = host.clone();
                async move {
                    tokio::net::lookup_host((host.as_str(), port))
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            })
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => MailError::Command("cancelled".to_string()),
                RetryError::Exhausted { last, .. } | RetryError::TimedOut { last } => {
                    MailError::Dns {
                        host: settings.smtp_server.clone(),
                        message: last,
                    }
                }
            })?;

        let tls = SmtpTls::for_port(settings.smtp_port);
        let config_path = self.config_dir.join("backup-muttrc");
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::write(&config_path, Self::render_config(settings, tls)).await?;

        let subject = format!("LND Channel Backup {}", Utc::now().to_rfc3339());
        let mut command = Command::new(&self.bin);
        command
            .arg("-F")
            .arg(&config_path)
            .arg("-s")
            .arg(&subject)
            .arg("-a")
            .arg(attachment)
            .arg("--");
        for recipient in &recipients {
            command.arg(recipient);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(to = %settings.to, "sending backup email");
        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(b"Backup attached.\n").await?;
        }
        let output = child.wait_with_output().await?;

        if output.status.success() {
            info!(to = %settings.to, "backup email sent");
            Ok(())
        } else {
            Err(MailError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}
