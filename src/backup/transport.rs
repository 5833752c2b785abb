// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote transfer via the sync tool, with Tor-aware routing.
//!
//! Every transfer gets an explicit timeout profile. Remotes whose host or
//! URL points into an anonymity network get the long budget, are routed
//! through the local SOCKS proxy, and skip certificate verification;
//! onion endpoints present self-signed certificates no CA chain can vouch
//! for. Everything else gets the short budget with normal TLS checks.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use url::Url;

use super::rclone_conf::RcloneConf;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn sync tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("transfer to {remote} failed: {stderr}")]
    Failed { remote: String, stderr: String },

    #[error("transfer to {remote} timed out after {seconds}s")]
    TimedOut { remote: String, seconds: u64 },
}

/// Per-invocation timeout and routing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProfile {
    pub connect_timeout: Duration,
    pub overall_timeout: Duration,
    pub io_timeout: Duration,
    pub socks_proxy: Option<String>,
    pub skip_cert_verify: bool,
}

impl TransferProfile {
    /// Short budget, normal TLS verification.
    pub fn clearnet() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(12),
            io_timeout: Duration::from_secs(10),
            socks_proxy: None,
            skip_cert_verify: false,
        }
    }

    /// Long budget through the SOCKS proxy, certificate checks off.
    pub fn onion(socks_proxy: &str) -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(60),
            io_timeout: Duration::from_secs(50),
            socks_proxy: Some(socks_proxy.to_string()),
            skip_cert_verify: true,
        }
    }

    /// Pick the profile for a `provider:path` remote by inspecting its
    /// config section.
    pub fn for_remote(conf: &RcloneConf, remote: &str, socks_proxy: &str) -> Self {
        let provider = remote.split(':').next().unwrap_or(remote);
        let host = conf.get(provider).and_then(section_host);
        match host {
            Some(host) if is_onion_host(&host) => Self::onion(socks_proxy),
            _ => Self::clearnet(),
        }
    }
}

/// Host named by a section: `host` for shell-style remotes, the URL host
/// for WebDAV-style ones.
fn section_host(section: &super::rclone_conf::Section) -> Option<String> {
    if let Some(host) = section.get("host") {
        return Some(host.to_string());
    }
    section
        .get("url")
        .and_then(|u| Url::parse(u).ok())
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Whether a host lives in an anonymity network.
pub fn is_onion_host(host: &str) -> bool {
    host.trim_end_matches('.')
        .to_ascii_lowercase()
        .ends_with(".onion")
}

/// Copies the backup artifact to one remote target.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn copy(
        &self,
        conf_path: &Path,
        source: &Path,
        remote: &str,
        profile: &TransferProfile,
    ) -> Result<(), TransportError>;
}

/// Transport invoking the `rclone` binary.
#[derive(Debug, Clone)]
pub struct RcloneTransport {
    bin: String,
}

impl RcloneTransport {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl RemoteTransport for RcloneTransport {
    async fn copy(
        &self,
        conf_path: &Path,
        source: &Path,
        remote: &str,
        profile: &TransferProfile,
    ) -> Result<(), TransportError> {
        let mut command = Command::new(&self.bin);
        command
            .arg("copy")
            .arg(source)
            .arg(remote)
            .arg("--config")
            .arg(conf_path)
            .arg("--contimeout")
            .arg(format!("{}s", profile.connect_timeout.as_secs()))
            .arg("--timeout")
            .arg(format!("{}s", profile.io_timeout.as_secs()))
            .arg("--log-level")
            .arg("INFO")
            .kill_on_drop(true);

        if profile.skip_cert_verify {
            command.arg("--no-check-certificate");
        }
        if let Some(proxy) = &profile.socks_proxy {
            let proxy_url = format!("socks5h://{proxy}");
            command.env("http_proxy", &proxy_url);
            command.env("https_proxy", &proxy_url);
        }

        debug!(remote = %remote, "invoking sync tool");
        let output = tokio::time::timeout(profile.overall_timeout, command.output())
            .await
            .map_err(|_| TransportError::TimedOut {
                remote: remote.to_string(),
                seconds: profile.overall_timeout.as_secs(),
            })??;

        if output.status.success() {
            Ok(())
        } else {
            Err(TransportError::Failed {
                remote: remote.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXY: &str = "127.0.0.1:9050";

    fn conf_with(host_line: &str) -> RcloneConf {
        RcloneConf::parse(&format!("[sftp]\ntype = sftp\n{host_line}\n"))
    }

    #[test]
    fn onion_host_selects_proxy_profile() {
        let conf = conf_with("host = abc123xyz.onion");
        let profile = TransferProfile::for_remote(&conf, "sftp:lnd-backups", PROXY);
        assert_eq!(profile, TransferProfile::onion(PROXY));
        assert_eq!(profile.connect_timeout, Duration::from_secs(30));
        assert_eq!(profile.overall_timeout, Duration::from_secs(60));
        assert_eq!(profile.io_timeout, Duration::from_secs(50));
        assert!(profile.skip_cert_verify);
        assert_eq!(profile.socks_proxy.as_deref(), Some(PROXY));
    }

    #[test]
    fn clearnet_host_selects_short_profile() {
        let conf = conf_with("host = mail.smtp2go.com");
        let profile = TransferProfile::for_remote(&conf, "sftp:lnd-backups", PROXY);
        assert_eq!(profile, TransferProfile::clearnet());
        assert_eq!(profile.connect_timeout, Duration::from_secs(5));
        assert_eq!(profile.overall_timeout, Duration::from_secs(12));
        assert_eq!(profile.io_timeout, Duration::from_secs(10));
        assert!(!profile.skip_cert_verify);
        assert!(profile.socks_proxy.is_none());
    }

    #[test]
    fn webdav_url_host_is_inspected() {
        let conf = RcloneConf::parse(
            "[nextcloud]\ntype = webdav\nurl = https://deadbeef.onion/remote.php/dav\n",
        );
        let profile = TransferProfile::for_remote(&conf, "nextcloud:lnd-backups", PROXY);
        assert!(profile.skip_cert_verify);
    }

    #[test]
    fn unknown_section_falls_back_to_clearnet() {
        let conf = RcloneConf::default();
        let profile = TransferProfile::for_remote(&conf, "ghost:path", PROXY);
        assert_eq!(profile, TransferProfile::clearnet());
    }

    #[test]
    fn onion_detection_handles_case_and_trailing_dot() {
        assert!(is_onion_host("ABC.ONION"));
        assert!(is_onion_host("x.onion."));
        assert!(!is_onion_host("onion.example.com"));
        assert!(!is_onion_host("mail.smtp2go.com"));
    }
}
