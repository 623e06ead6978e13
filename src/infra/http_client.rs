use std::time::Duration;

use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::constants::DEFAULT_HTTP_TIMEOUT_SECS;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};

const AGENT: &str = concat!("event_aggregator/", env!("CARGO_PKG_VERSION"));

/// `HttpClientPort` backed by a shared reqwest client with a per-request timeout
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
    }
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str, bearer_token: Option<&str>) -> Result<HttpGetResult, String> {
        let mut request = self.client.get(url).header(USER_AGENT, AGENT);
        if let Some(token) = bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let resp = request.send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpGetResult { status, bytes })
    }
}
