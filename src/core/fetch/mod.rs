//! # Fetch Module
//!
//! Plain GET requests with the headers the hosts expect: a browser user
//! agent, a referer and optional per-host cookies.
//!
//! The [`HttpFetcher`] trait is the seam between the network and the
//! listing/ingest logic, so both can be driven by in-memory fakes.

mod credentials;
mod http;

pub use credentials::{CookieSet, Credentials, HostCredentials};
pub use http::ReqwestFetcher;

use crate::error::FetchError;
use reqwest::Url;
use std::time::Duration;

/// Desktop Chrome; several hosts refuse unknown agents
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36";

/// Everything a single GET needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub referer: String,
    pub user_agent: String,
    pub cookies: Option<CookieSet>,
}

/// Fetch a URL and return its body.
///
/// Implementations must treat any status other than 200 and any empty
/// body as an error.
pub trait HttpFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchError>;
}

/// Request defaults shared by listing and ingest
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Fixed referer; when unset the target's own origin is sent
    pub referer: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Some image hosts serve broken certificate chains
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: None,
            connect_timeout: Duration::from_secs(6),
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Build the request for `url`, attaching matching cookies
    pub fn request_for(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<FetchRequest, FetchError> {
        let referer = match &self.referer {
            Some(referer) => referer.clone(),
            None => origin_of(url)?,
        };

        Ok(FetchRequest {
            url: url.to_string(),
            referer,
            user_agent: self.user_agent.clone(),
            cookies: credentials.lookup(url).cloned(),
        })
    }
}

/// `scheme://host[:port]/` of a URL
pub fn origin_of(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let host = parsed.host_str().ok_or_else(|| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: "URL has no host".to_string(),
    })?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
        None => format!("{}://{}/", parsed.scheme(), host),
    })
}
