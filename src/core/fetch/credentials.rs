//! Per-host cookie table.
//!
//! A small lookup structure passed into each ingest call: the first entry
//! whose key occurs in the request host supplies the cookies. Nothing here
//! renews or acquires credentials.

use crate::error::SyncError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Cookies sent with every request to one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSet(pub BTreeMap<String, String>);

impl CookieSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a `Cookie` header value
    pub fn header_value(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One row of the credentials table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCredentials {
    /// Matched as a substring of the request host, e.g. `v2ph.com`
    pub host: String,
    pub cookies: CookieSet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    hosts: Vec<HostCredentials>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row; earlier rows win on overlapping keys
    pub fn with_host(mut self, host: &str, cookies: CookieSet) -> Self {
        self.hosts.push(HostCredentials {
            host: host.to_string(),
            cookies,
        });
        self
    }

    /// Parse a JSON table: `[{"host": "...", "cookies": {"name": "value"}}]`
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text)
            .map_err(|e| SyncError::Config(format!("invalid credentials table: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read credentials {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Cookies for `url`, if any row matches its host
    pub fn lookup(&self, url: &str) -> Option<&CookieSet> {
        let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
        self.hosts
            .iter()
            .find(|row| !row.host.is_empty() && host.contains(&row.host.to_lowercase()))
            .map(|row| &row.cookies)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookies(pairs: &[(&str, &str)]) -> CookieSet {
        CookieSet(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn lookup_matches_host_substring() {
        let table = Credentials::new()
            .with_host("nhentai", cookies(&[("cf_clearance", "abc")]))
            .with_host("v2ph.com", cookies(&[("session", "xyz")]));

        let found = table.lookup("https://cdn.v2ph.com/photos/1.jpg").unwrap();
        assert_eq!(found.header_value(), "session=xyz");
        assert!(table.lookup("https://i.nhentai.net/a.jpg").is_some());
    }

    #[test]
    fn lookup_ignores_path_and_unknown_hosts() {
        let table = Credentials::new().with_host("v2ph", cookies(&[("a", "1")]));
        assert!(table.lookup("https://example.com/v2ph/1.jpg").is_none());
        assert!(table.lookup("not a url").is_none());
    }

    #[test]
    fn header_value_joins_pairs() {
        let set = cookies(&[("b", "2"), ("a", "1")]);
        assert_eq!(set.header_value(), "a=1; b=2");
    }

    #[test]
    fn parses_json_table() {
        let table = Credentials::from_json(
            r#"[{"host": "xsnvshen.com", "cookies": {"token": "t"}}]"#,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.lookup("http://img.xsnvshen.com/x.jpg").is_some());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Credentials::from_json("{"),
            Err(SyncError::Config(_))
        ));
    }
}
