//! Inference service HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use fswap_media::InferenceOptions;
use fswap_models::{decode_execution_providers, ExecutionProvider, FaceRef, StageName};

use crate::error::{MlError, MlResult};
use crate::types::{
    ClassifyRequest, ClassifyResponse, DetectRequest, DetectResponse, EnhanceRequest,
    HealthResponse, ModelStatus, ProvidersResponse, ReleaseRequest, SwapRequest,
};

/// Configuration for the inference client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// First retry delay, doubled on each attempt
    pub retry_backoff: Duration,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ML_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("ML_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("ML_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_backoff: defaults.retry_backoff,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Client for the inference service.
#[derive(Clone)]
pub struct MlClient {
    http: Client,
    config: MlClientConfig,
}

impl MlClient {
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn config(&self) -> &MlClientConfig {
        &self.config
    }

    /// Check if the service is healthy. Transport errors count as unhealthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = self.url("/health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Inference service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Inference service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// All faces in `image`, in detector order.
    pub async fn detect(&self, image: &Path, options: &InferenceOptions) -> MlResult<Vec<FaceRef>> {
        let request = DetectRequest {
            image_path: path_string(image),
            options: options.clone(),
        };
        let response: DetectResponse = self.post_json("/detect", &request).await?;
        debug!(image = %image.display(), faces = response.faces.len(), "Faces detected");
        Ok(response.faces)
    }

    pub async fn swap(
        &self,
        source: &FaceRef,
        targets: &[FaceRef],
        input: &Path,
        output: &Path,
        options: &InferenceOptions,
    ) -> MlResult<()> {
        let request = SwapRequest {
            source_face: source.clone(),
            target_faces: targets.to_vec(),
            input_path: path_string(input),
            output_path: path_string(output),
            options: options.clone(),
        };
        self.post_empty("/swap", &request).await
    }

    pub async fn enhance(
        &self,
        faces: &[FaceRef],
        input: &Path,
        output: &Path,
        options: &InferenceOptions,
    ) -> MlResult<()> {
        let request = EnhanceRequest {
            faces: faces.to_vec(),
            input_path: path_string(input),
            output_path: path_string(output),
            options: options.clone(),
        };
        self.post_empty("/enhance", &request).await
    }

    /// Content safety verdict for an image or video.
    pub async fn classify(&self, path: &Path) -> MlResult<ClassifyResponse> {
        let request = ClassifyRequest {
            path: path_string(path),
        };
        self.post_json("/classify", &request).await
    }

    /// Whether the model for `stage` is installed. Unknown stages report `false`.
    pub async fn model_status(&self, stage: StageName) -> MlResult<bool> {
        let url = self.url(&format!("/models/{}", stage.as_str()));
        let response = self
            .with_retry(|| async { send(self.http.get(&url)).await })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let status: ModelStatus = parse(response).await?;
        Ok(status.available)
    }

    /// Ask the backend to free transient accelerator memory.
    pub async fn release(&self, options: &InferenceOptions) -> MlResult<()> {
        let request = ReleaseRequest {
            options: options.clone(),
        };
        self.post_empty("/release", &request).await
    }

    /// Runtime provider names the backend can use, in preference order.
    pub async fn available_providers(&self) -> MlResult<Vec<String>> {
        let url = self.url("/providers");
        let response = self
            .with_retry(|| async { send(self.http.get(&url)).await })
            .await?;
        let providers: ProvidersResponse = parse(response).await?;
        Ok(providers.providers)
    }

    /// Runtime providers matching the requested ones, in the backend's order.
    pub async fn select_providers(&self, requested: &[ExecutionProvider]) -> MlResult<Vec<String>> {
        let available = self.available_providers().await?;
        let requested: Vec<&str> = requested.iter().map(|p| p.as_str()).collect();
        Ok(decode_execution_providers(&requested, &available))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> MlResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("Sending inference request to {}", url);

        let response = self
            .with_retry(|| async { send(self.http.post(&url).json(body)).await })
            .await?;
        parse(response).await
    }

    async fn post_empty<Req>(&self, path: &str, body: &Req) -> MlResult<()>
    where
        Req: Serialize + ?Sized,
    {
        let _: serde_json::Value = self.post_json(path, body).await?;
        Ok(())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff * 2u32.pow(attempt);
                    warn!(
                        "Inference request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(MlError::RequestFailed("Unknown error".to_string())))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Send a request, turning 503 into a retryable error.
async fn send(request: reqwest::RequestBuilder) -> MlResult<Response> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            MlError::ServiceUnavailable(format!("request timed out: {}", e))
        } else {
            MlError::Network(e)
        }
    })?;

    if response.status() == StatusCode::SERVICE_UNAVAILABLE {
        let body = response.text().await.unwrap_or_default();
        return Err(MlError::ServiceUnavailable(body));
    }
    Ok(response)
}

async fn parse<T: DeserializeOwned>(response: Response) -> MlResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MlError::RequestFailed(format!(
            "Inference service returned {}: {}",
            status, body
        )));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return serde_json::from_str("null")
            .map_err(|e| MlError::InvalidResponse(e.to_string()));
    }
    serde_json::from_slice(&bytes).map_err(|e| MlError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fswap_models::BoundingBox;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MlClient {
        let config = MlClientConfig {
            retry_backoff: Duration::from_millis(10),
            ..MlClientConfig::default()
        }
        .with_base_url(server.uri());
        MlClient::new(config).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = MlClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.max_retries, 2);
    }

    #[tokio::test]
    async fn test_detect_parses_faces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .and(body_partial_json(json!({"image_path": "/data/face.jpg"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "faces": [
                    {"bbox": {"x": 120.0, "y": 4.0, "width": 30.0, "height": 30.0}, "score": 0.9},
                    {"bbox": {"x": 12.0, "y": 8.0, "width": 32.0, "height": 32.0}, "score": 0.8}
                ]
            })))
            .mount(&server)
            .await;

        let faces = client_for(&server)
            .detect(Path::new("/data/face.jpg"), &InferenceOptions::default())
            .await
            .unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[1].bbox.x, 12.0);
    }

    #[tokio::test]
    async fn test_retries_when_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/swap"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/swap"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let face = FaceRef::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        client_for(&server)
            .swap(
                &face,
                &[face.clone()],
                Path::new("/tmp/0001.png"),
                Path::new("/tmp/0001.png"),
                &InferenceOptions::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/enhance"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad faces"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .enhance(&[], Path::new("a.png"), Path::new("a.png"), &InferenceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::RequestFailed(msg) if msg.contains("bad faces")));
    }

    #[tokio::test]
    async fn test_model_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/face_swapper"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"stage": "face_swapper", "available": true})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models/face_enhancer"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.model_status(StageName::FaceSwapper).await.unwrap());
        assert!(!client.model_status(StageName::FaceEnhancer).await.unwrap());
    }

    #[tokio::test]
    async fn test_select_providers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/providers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "providers": ["CUDAExecutionProvider", "CPUExecutionProvider"]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let selected = client
            .select_providers(&[ExecutionProvider::Cpu, ExecutionProvider::Rocm])
            .await
            .unwrap();
        assert_eq!(selected, vec!["CPUExecutionProvider".to_string()]);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let config = MlClientConfig {
            max_retries: 0,
            ..MlClientConfig::default()
        }
        .with_base_url("http://127.0.0.1:9");
        let client = MlClient::new(config).unwrap();
        assert!(!client.health_check().await.unwrap());
    }
}
