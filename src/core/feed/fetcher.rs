use std::time::Duration;

use reqwest::header::USER_AGENT;

/// Identifying agent string sent with every feed request.
pub const FETCH_USER_AGENT: &str = concat!("feedr/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
}

/// Client carrying the deadline for every fetch; timeouts surface as
/// [`FetchError::Request`] like any other transport failure.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(client)
}

/// Issues a single GET and returns the full response body. A non-2xx status
/// fails the fetch; retry policy belongs to the caller's next tick.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .header(USER_AGENT, FETCH_USER_AGENT)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    let body = response.bytes().await?.to_vec();
    Ok(body)
}
