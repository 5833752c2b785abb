// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Daemon config file model (`lnd.conf`).
//!
//! Plain `key=value` lines; a key may repeat for array-valued options
//! (`rpclisten`, `restlisten`, `externalhosts`, ...). Order is preserved on
//! render so a round-trip does not shuffle the operator's file.

use std::io;
use std::path::Path;

/// Default listen addresses the service depends on; the readiness probe and
/// the REST client target these regardless of any extra operator entries.
pub const DEFAULT_RPC_LISTEN: &str = "0.0.0.0:10009";
pub const DEFAULT_REST_LISTEN: &str = "0.0.0.0:8080";

/// Parsed daemon config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LndConf {
    entries: Vec<(String, String)>,
}

impl LndConf {
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        Self { entries }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("tmp");
        std::fs::write(&temp, self.render())?;
        std::fs::rename(&temp, path)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// First value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for a key, in file order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true"))
    }

    /// Replace every value of a key with a single value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value.to_string()));
    }

    /// Append a value for a key if not already present.
    pub fn add_unique(&mut self, key: &str, value: &str) {
        if !self.get_all(key).contains(&value) {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    /// Force the listen addresses and Tor proxy this service depends on.
    ///
    /// Returns true when anything changed and the file should be rewritten.
    pub fn normalize_for_service(&mut self, socks_proxy: &str) -> bool {
        let before = self.clone();
        self.add_unique("rpclisten", DEFAULT_RPC_LISTEN);
        self.add_unique("restlisten", DEFAULT_REST_LISTEN);
        if self.get("tor.socks") != Some(socks_proxy) {
            self.set("tor.socks", socks_proxy);
        }
        *self != before
    }

    /// Whether the node advertises any externally reachable address.
    pub fn has_external_address(&self) -> bool {
        self.get("externalip").is_some() || !self.get_all("externalhosts").is_empty()
    }
}
