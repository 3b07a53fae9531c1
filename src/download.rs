use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{MusicStreamError, Result};

/// Size of the write buffer used when streaming a response to disk
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

/// Shoutcast/Icecast header naming the station's web page
pub const ICY_URL_HEADER: &str = "icy-url";

/// HTTP client with the crate's redirect, TLS and timeout policy
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agent: HeaderValue,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            user_agent: HeaderValue::from_str(&config.user_agent)?,
        })
    }

    /// Default headers merged with the caller's additional values
    fn create_custom_headers(&self, additional_headers: Option<HeaderMap>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());

        if let Some(custom) = additional_headers {
            headers.extend(custom);
        }

        headers
    }

    /// Execute HTTP request with error handling
    async fn execute_request(
        &self,
        method: reqwest::Method,
        url: &str,
        headers: Option<HeaderMap>,
    ) -> Result<reqwest::Response> {
        let request_headers = self.create_custom_headers(headers);
        let request = self.client.request(method, url).headers(request_headers);

        let response = request.send().await.map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(MusicStreamError::HttpError {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }

    /// Get HTTP response from URL; the body is left unread
    pub async fn get_response(&self, url: &str, headers: HeaderMap) -> Result<reqwest::Response> {
        self.execute_request(reqwest::Method::GET, url, Some(headers))
            .await
    }

    /// Download text content from URL
    pub async fn download_text(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let response = self.get_response(url, headers).await?;
        response.text().await.map_err(MusicStreamError::from)
    }

    /// Execute POST request with JSON body and custom headers
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        headers: HeaderMap,
    ) -> Result<T> {
        let request_headers = self.create_custom_headers(Some(headers));
        let request = self.client.post(url).headers(request_headers).json(body);

        let response = request.send().await.map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(MusicStreamError::from)
        } else {
            Err(MusicStreamError::HttpError {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }

    /// Recover the station page a raw stream URL advertises in its `icy-url` header
    pub async fn origin_url(&self, stream_url: &str) -> Result<Option<String>> {
        let response = self.get_response(stream_url, HeaderMap::new()).await?;
        let origin = response
            .headers()
            .get(ICY_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        debug!(stream_url, ?origin, "origin lookup");
        Ok(origin)
    }

    /// Stream the response body of `url` into `path`. Returns the number of bytes written.
    ///
    /// A partially written file is left behind on failure.
    pub async fn download_to_file(
        &self,
        url: &str,
        headers: HeaderMap,
        path: &Path,
    ) -> Result<u64> {
        let response = self.get_response(url, headers).await?;
        let file = tokio::fs::File::create(path).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| map_send_error(url, e))?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        debug!(url, path = %path.display(), written, "download finished");
        Ok(written)
    }
}

fn map_send_error(url: &str, e: reqwest::Error) -> MusicStreamError {
    if e.is_timeout() {
        MusicStreamError::RequestTimeout(url.to_string())
    } else {
        MusicStreamError::NetworkError(e)
    }
}
