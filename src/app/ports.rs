use async_trait::async_trait;

/// Outbound HTTP seam used by every collector.
///
/// Errors are plain strings: collectors only log them before degrading to an
/// empty result, so no caller ever matches on the variant.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str, bearer_token: Option<&str>) -> Result<HttpGetResult, String>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}
