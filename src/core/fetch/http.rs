//! Blocking HTTP fetcher backed by reqwest.

use super::{FetchConfig, FetchRequest, HttpFetcher};
use crate::error::FetchError;
use reqwest::blocking::Client;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use reqwest::StatusCode;

/// Shares one connection pool across every worker
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(REFERER, &request.referer)
            .header(USER_AGENT, &request.user_agent);

        if let Some(cookies) = request.cookies.as_ref().filter(|c| !c.is_empty()) {
            builder = builder.header(COOKIE, cookies.header_value());
        }

        let transport = |e: reqwest::Error| FetchError::Transport {
            url: request.url.clone(),
            reason: e.to_string(),
        };

        let response = builder.send().map_err(transport)?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().map_err(transport)?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody {
                url: request.url.clone(),
            });
        }

        Ok(body.to_vec())
    }
}
