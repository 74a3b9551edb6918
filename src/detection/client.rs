//! Detection client.
//!
//! Turns a media URL into a [`DetectionResult`]. When a proxy bus is set (the
//! client runs inside a content script) the request is first delegated to the
//! background context via `ANALYZE_IMAGE`; otherwise, or when the proxy gives
//! no usable answer, the client calls the classification API directly.
//!
//! Every public operation resolves to a result: failures become `failed`
//! results that allow the media (fail-open).

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use url::Url;

use super::types::{
    ApiErrorBody, DetectionContext, DetectionRequest, DetectionResult, MediaKind, PredictResponse,
};
use super::verdict::{derive_filtered_action, FilterPreferences};
use crate::config::{
    Thresholds, HTTP_STATUS_QUOTA_EXCEEDED, MIN_INLINE_IMAGE_BYTES, PREDICT_PATH,
    SERVER_SUBMISSION_THRESHOLD,
};
use crate::error_handling::{DetectionError, ScanStats};
use crate::messaging::{MessageBus, RuntimeMessage, RuntimeResponse};
use crate::storage::{keys, Storage, StorageArea};
use crate::utils::sanitize_and_truncate_error_message;

/// Anything that can classify a media request.
///
/// Implementations must not fail: errors are reported as failed results.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn analyze(&self, request: &DetectionRequest, thresholds: Thresholds) -> DetectionResult;
}

/// Media URLs that are not remotely fetchable.
pub fn is_inline_media_url(url: &str) -> bool {
    url.starts_with("data:") || url.starts_with("blob:")
}

/// Client of the remote classification API.
pub struct DetectionClient {
    http: reqwest::Client,
    api_base: String,
    storage: Storage,
    proxy: Option<Arc<MessageBus>>,
    stats: Arc<ScanStats>,
}

impl DetectionClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, storage: Storage) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            storage,
            proxy: None,
            stats: Arc::new(ScanStats::new()),
        }
    }

    /// Delegates requests to the background context through `bus` first.
    pub fn with_proxy(mut self, bus: Arc<MessageBus>) -> Self {
        self.proxy = Some(bus);
        self
    }

    /// Records failure categories into `stats`.
    pub fn with_stats(mut self, stats: Arc<ScanStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<ScanStats> {
        &self.stats
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Classifies `request`. Never fails.
    pub async fn analyze(
        &self,
        request: &DetectionRequest,
        thresholds: Thresholds,
    ) -> DetectionResult {
        match request.media_kind {
            MediaKind::Image => {
                self.analyze_image(&request.url, request.context.clone(), thresholds)
                    .await
            }
            MediaKind::Video => self.analyze_video(&request.url),
        }
    }

    /// Classifies one image URL, through the proxy when one is set.
    pub async fn analyze_image(
        &self,
        url: &str,
        context: Option<DetectionContext>,
        thresholds: Thresholds,
    ) -> DetectionResult {
        if is_inline_media_url(url) {
            log::debug!("Skipping inline media {}", preview(url));
            return DetectionResult::skipped(url);
        }

        if let Some(result) = self.analyze_via_proxy(url, context, thresholds).await {
            return result;
        }

        match self.try_analyze_direct(url, thresholds).await {
            Ok(result) => result,
            Err(e) => self.fail(url, MediaKind::Image, e),
        }
    }

    async fn analyze_via_proxy(
        &self,
        url: &str,
        context: Option<DetectionContext>,
        thresholds: Thresholds,
    ) -> Option<DetectionResult> {
        let bus = self.proxy.as_ref()?;
        if !bus.is_context_valid() {
            return None;
        }
        let message = RuntimeMessage::AnalyzeImage {
            url: url.to_string(),
            context,
        };
        match bus.send(message).await {
            Ok(Some(RuntimeResponse::Detection(result))) => {
                // The background derived the action with its own settings
                let filters = self.filters().await;
                Some(result.with_action_from(|predictions| {
                    derive_filtered_action(predictions, thresholds, &filters)
                }))
            }
            Ok(Some(RuntimeResponse::Ack { error, .. })) => {
                log::warn!(
                    "Background proxy could not analyze {}: {}",
                    preview(url),
                    error.as_deref().unwrap_or("no detail")
                );
                None
            }
            Ok(None) => {
                log::debug!("No background answer for {}, calling API directly", preview(url));
                None
            }
            Err(e) => {
                log::warn!("Background proxy failed: {}", e);
                None
            }
        }
    }

    async fn try_analyze_direct(
        &self,
        url: &str,
        thresholds: Thresholds,
    ) -> Result<DetectionResult, DetectionError> {
        let token = self.auth_token().await?;
        let (bytes, filename, mime) = self.fetch_media(url).await?;
        let response = self.predict(&token, bytes, filename, mime).await?;
        Ok(self.complete(url, response, thresholds).await)
    }

    /// Classifies an inline `data:image/...;base64,` payload.
    ///
    /// Payloads that are not image data URLs, do not decode, or decode to
    /// fewer than 100 bytes fail open with "Failed to convert image data".
    pub async fn analyze_data(
        &self,
        image_data: &str,
        url: &str,
        thresholds: Thresholds,
    ) -> DetectionResult {
        match self.try_analyze_data(image_data, url, thresholds).await {
            Ok(result) => result,
            Err(e) => self.fail(url, MediaKind::Image, e),
        }
    }

    async fn try_analyze_data(
        &self,
        image_data: &str,
        url: &str,
        thresholds: Thresholds,
    ) -> Result<DetectionResult, DetectionError> {
        let token = self.auth_token().await?;
        let bytes = decode_image_data(image_data).ok_or(DetectionError::InvalidImageData)?;
        let response = self
            .predict(&token, bytes, "image.jpg".to_string(), "image/jpeg".to_string())
            .await?;
        Ok(self.complete(url, response, thresholds).await)
    }

    /// Video classification has no backend yet.
    pub fn analyze_video(&self, url: &str) -> DetectionResult {
        DetectionResult::failed(url, MediaKind::Video, DetectionError::Unsupported.to_string())
    }

    /// Analyzes `requests` one after another.
    pub async fn batch_analyze(
        &self,
        requests: &[DetectionRequest],
        thresholds: Thresholds,
    ) -> Vec<DetectionResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.analyze(request, thresholds).await);
        }
        results
    }

    async fn auth_token(&self) -> Result<String, DetectionError> {
        self.storage
            .read::<String>(keys::AUTH_TOKEN, StorageArea::Local)
            .await?
            .filter(|token| !token.is_empty())
            .ok_or(DetectionError::AuthenticationRequired)
    }

    /// Per-category filters; defaults when unset or unreadable.
    async fn filters(&self) -> FilterPreferences {
        match self
            .storage
            .read::<FilterPreferences>(keys::FILTERS, StorageArea::Sync)
            .await
        {
            Ok(filters) => filters.unwrap_or_default(),
            Err(e) => {
                log::debug!("Using default filters: {}", e);
                FilterPreferences::default()
            }
        }
    }

    /// Downloads the media bytes, with a file name and MIME type for upload.
    async fn fetch_media(&self, url: &str) -> Result<(Vec<u8>, String, String), DetectionError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DetectionError::MediaFetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DetectionError::MediaFetch(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DetectionError::MediaFetch(e.to_string()))?;
        Ok((bytes.to_vec(), file_name_for(url), mime))
    }

    /// `POST /api/v1/predict` with the media as multipart `file`.
    async fn predict(
        &self,
        token: &str,
        bytes: Vec<u8>,
        filename: String,
        mime: String,
    ) -> Result<PredictResponse, DetectionError> {
        let part = Part::bytes(bytes).file_name(filename).mime_str(&mime)?;
        let form = Form::new()
            .part("file", part)
            .text("threshold", SERVER_SUBMISSION_THRESHOLD);

        let response = self
            .http
            .post(format!("{}{}", self.api_base, PREDICT_PATH))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == HTTP_STATUS_QUOTA_EXCEEDED {
            return Err(DetectionError::QuotaExceeded);
        }
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message())
                .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
            return Err(DetectionError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<PredictResponse>().await?)
    }

    async fn complete(
        &self,
        url: &str,
        response: PredictResponse,
        thresholds: Thresholds,
    ) -> DetectionResult {
        let filters = self.filters().await;
        let predictions = response.predictions();
        let action = derive_filtered_action(&predictions, thresholds, &filters);
        log::debug!(
            "Classified {} as {} ({} predictions)",
            preview(url),
            action.as_ref(),
            predictions.len()
        );
        DetectionResult::completed(
            url,
            MediaKind::Image,
            predictions,
            action,
            response.quota_remaining,
        )
    }

    fn fail(&self, url: &str, media_kind: MediaKind, error: DetectionError) -> DetectionResult {
        self.stats.increment_failure(error.failure_type());
        match &error {
            DetectionError::AuthenticationRequired => {
                log::debug!("Detection skipped for {}: {}", preview(url), error)
            }
            _ => log::warn!("Detection failed for {}: {}", preview(url), error),
        }
        DetectionResult::failed(
            url,
            media_kind,
            sanitize_and_truncate_error_message(&error.to_string()),
        )
    }
}

#[async_trait]
impl Detector for DetectionClient {
    async fn analyze(&self, request: &DetectionRequest, thresholds: Thresholds) -> DetectionResult {
        DetectionClient::analyze(self, request, thresholds).await
    }
}

/// Decodes the payload of an image data URL.
fn decode_image_data(image_data: &str) -> Option<Vec<u8>> {
    let rest = image_data.strip_prefix("data:image/")?;
    let (_, content) = rest.split_once(',')?;
    let bytes = BASE64.decode(content.trim()).ok()?;
    (bytes.len() >= MIN_INLINE_IMAGE_BYTES).then_some(bytes)
}

/// Last path segment of `url`, or `image.jpg`.
fn file_name_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image.jpg".to_string())
}

/// First 80 characters of a URL, for log lines.
fn preview(url: &str) -> String {
    if url.chars().count() > 80 {
        format!("{}...", url.chars().take(80).collect::<String>())
    } else {
        url.to_string()
    }
}
