//! `reqwest`-backed implementation of [`RemoteJobClient`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use motility_contract::{
    AnalysisContractError, DELETE_PATH, DOWNLOAD_PATH, ExportFormat, HEALTH_PATH, HISTORY_PATH,
    HealthReport, PARAMETERS_FIELD, RESULTS_PATH, STATISTICS_PATH, STATUS_PATH, SUBMIT_PATH,
    SubmitReceipt, VIDEO_FIELD, parse_error_detail, parse_health_report, parse_history_response,
    parse_result_payload, parse_status_response, parse_submit_response,
};
use motility_core::{
    AnalysisParameters, HistoryEntry, InputRef, RemoteId, ResultPayload, StatusSnapshot,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{ClientError, ProgressTracker, RemoteJobClient, UploadProgress};

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upload chunk size used for progress reporting.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Connection settings for [`HttpJobClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service base address.
    pub base_url: Url,
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Bytes per upload chunk; each chunk is one progress step.
    pub upload_chunk_size: usize,
}

impl ClientConfig {
    /// Creates a validated configuration with default timeout and chunking.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidConfig`] when `base_url` fails
    /// [`validate_base_url`].
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("motility-client/{}", env!("CARGO_PKG_VERSION")),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        })
    }

    /// Overrides the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the upload chunk size (minimum one byte).
    pub fn with_upload_chunk_size(mut self, bytes: usize) -> Self {
        self.upload_chunk_size = bytes.max(1);
        self
    }
}

/// Validates a service base address.
///
/// # Errors
/// Returns [`ClientError::InvalidConfig`] when the address does not parse,
/// uses a scheme other than `http`/`https`, has no host, or carries a query
/// or fragment.
pub fn validate_base_url(raw: &str) -> Result<Url, ClientError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|error| ClientError::InvalidConfig(format!("invalid base url: {error}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::InvalidConfig(
            "base url must use http or https".to_string(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(ClientError::InvalidConfig(
            "base url must include a host".to_string(),
        ));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ClientError::InvalidConfig(
            "base url must not carry a query or fragment".to_string(),
        ));
    }
    if parsed.scheme() == "http" {
        warn!(base_url = %parsed, "analysis server is configured without TLS");
    }

    Ok(parsed)
}

/// Production client for the analysis service.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpJobClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidConfig`] when the HTTP stack cannot be
    /// initialized.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|error| ClientError::InvalidConfig(error.to_string()))?;
        Ok(Self { config, http })
    }

    /// Returns the configured base address.
    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidConfig("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ClientError> {
        let url = self.endpoint(segments)?;
        debug!(method = %method, url = %url, "sending request");
        Ok(self.http.request(method, url))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Bytes, ClientError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if !status.is_success() {
            return Err(ClientError::Server {
                status_code: status.as_u16(),
                detail: parse_error_detail(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl RemoteJobClient for HttpJobClient {
    async fn submit(
        &self,
        input: &InputRef,
        parameters: &AnalysisParameters,
        progress: Option<UploadProgress>,
    ) -> Result<SubmitReceipt, ClientError> {
        let path = media_path(&input.uri)?;
        let media = tokio::fs::read(&path)
            .await
            .map_err(|error| ClientError::Media(format!("{}: {error}", path.display())))?;
        let total = media.len() as u64;

        let body = upload_body(Bytes::from(media), self.config.upload_chunk_size, progress);
        let video = Part::stream_with_length(body, total)
            .file_name(input.effective_file_name().to_string())
            .mime_str(input.effective_mime_type())
            .map_err(|error| ClientError::Media(format!("invalid mime type: {error}")))?;

        let mut form = Form::new().part(VIDEO_FIELD, video);
        if !parameters.is_empty() {
            let encoded = serde_json::to_string(parameters)
                .map_err(|error| ClientError::Media(format!("parameters: {error}")))?;
            form = form.text(PARAMETERS_FIELD, encoded);
        }

        let request = self.request(Method::POST, &[SUBMIT_PATH])?.multipart(form);
        let body = self.execute(request).await?;
        parse_submit_response(&body).map_err(decode_error)
    }

    async fn fetch_status(&self, remote_id: &RemoteId) -> Result<StatusSnapshot, ClientError> {
        let request = self.request(Method::GET, &[STATUS_PATH, remote_id.as_str()])?;
        let body = self.execute(request).await?;
        parse_status_response(&body).map_err(decode_error)
    }

    async fn fetch_result(&self, remote_id: &RemoteId) -> Result<ResultPayload, ClientError> {
        let request = self.request(Method::GET, &[RESULTS_PATH, remote_id.as_str()])?;
        let body = self.execute(request).await?;
        parse_result_payload(&body).map_err(decode_error)
    }

    async fn download(
        &self,
        remote_id: &RemoteId,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        let request = self
            .request(Method::GET, &[DOWNLOAD_PATH, remote_id.as_str()])?
            .query(&[("format", format.as_str())]);
        Ok(self.execute(request).await?.to_vec())
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        let request = self.request(Method::GET, &[HISTORY_PATH])?;
        let body = self.execute(request).await?;
        parse_history_response(&body).map_err(decode_error)
    }

    async fn delete(&self, remote_id: &RemoteId) -> Result<(), ClientError> {
        let request = self.request(Method::DELETE, &[DELETE_PATH, remote_id.as_str()])?;
        self.execute(request).await.map(|_| ())
    }

    async fn statistics(&self) -> Result<Value, ClientError> {
        let request = self.request(Method::GET, &[STATISTICS_PATH])?;
        let body = self.execute(request).await?;
        serde_json::from_slice(&body).map_err(|error| ClientError::Decode(error.to_string()))
    }

    async fn health(&self) -> Result<HealthReport, ClientError> {
        let request = self.request(Method::GET, &[HEALTH_PATH])?;
        let body = self.execute(request).await?;
        parse_health_report(&body).map_err(decode_error)
    }
}

fn transport_error(error: reqwest::Error) -> ClientError {
    ClientError::Transport(error.to_string())
}

fn decode_error(error: AnalysisContractError) -> ClientError {
    ClientError::Decode(error.to_string())
}

/// Resolves an input uri to a local path; only plain paths and `file://`
/// URIs are readable.
fn media_path(uri: &str) -> Result<PathBuf, ClientError> {
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| ClientError::Media(format!("not a local file uri: {uri}"))),
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => Err(ClientError::Media(format!(
            "unsupported media uri scheme: {}",
            url.scheme()
        ))),
        _ => Ok(PathBuf::from(uri)),
    }
}

fn upload_body(media: Bytes, chunk_size: usize, progress: Option<UploadProgress>) -> reqwest::Body {
    let chunk_size = chunk_size.max(1);
    let mut tracker = ProgressTracker::new(media.len() as u64, progress);
    let chunks: Vec<Bytes> = (0..media.len())
        .step_by(chunk_size)
        .map(|start| media.slice(start..(start + chunk_size).min(media.len())))
        .collect();

    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        tracker.advance(chunk.len());
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}
