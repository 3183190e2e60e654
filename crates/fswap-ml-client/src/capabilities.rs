//! Capability trait implementations backed by [`MlClient`].
//!
//! The service keeps its models resident, so "loading" a kernel just hands
//! out another client; the process-wide `InferenceHandles` still gate the
//! first use.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use fswap_media::{
    ContentSafetyClassifier, FaceAnalyser, FaceEnhancer, FaceSwapper, InferenceOptions,
    MediaResult, ModelLoader,
};
use fswap_models::{FaceRef, StageName};

use crate::client::MlClient;

#[async_trait]
impl FaceAnalyser for MlClient {
    async fn detect_faces(&self, image: &Path, opts: &InferenceOptions) -> MediaResult<Vec<FaceRef>> {
        Ok(self.detect(image, opts).await?)
    }
}

#[async_trait]
impl FaceSwapper for MlClient {
    async fn swap_faces(
        &self,
        source: &FaceRef,
        targets: &[FaceRef],
        input: &Path,
        output: &Path,
        opts: &InferenceOptions,
    ) -> MediaResult<()> {
        Ok(self.swap(source, targets, input, output, opts).await?)
    }
}

#[async_trait]
impl FaceEnhancer for MlClient {
    async fn enhance_faces(
        &self,
        faces: &[FaceRef],
        input: &Path,
        output: &Path,
        opts: &InferenceOptions,
    ) -> MediaResult<()> {
        Ok(self.enhance(faces, input, output, opts).await?)
    }
}

#[async_trait]
impl ContentSafetyClassifier for MlClient {
    async fn is_unsafe(&self, path: &Path) -> MediaResult<bool> {
        let verdict = self.classify(path).await?;
        debug!(path = %path.display(), unsafe_content = verdict.is_unsafe, score = ?verdict.score, "Content classified");
        Ok(verdict.is_unsafe)
    }
}

#[async_trait]
impl ModelLoader for MlClient {
    async fn model_available(&self, stage: StageName) -> MediaResult<bool> {
        Ok(self.model_status(stage).await?)
    }

    async fn load_analyser(&self) -> MediaResult<Box<dyn FaceAnalyser>> {
        info!(url = %self.config().base_url, "Connecting face analyser");
        Ok(Box::new(self.clone()))
    }

    async fn load_swapper(&self) -> MediaResult<Box<dyn FaceSwapper>> {
        info!(url = %self.config().base_url, "Connecting face swapper");
        Ok(Box::new(self.clone()))
    }

    async fn load_enhancer(&self) -> MediaResult<Box<dyn FaceEnhancer>> {
        info!(url = %self.config().base_url, "Connecting face enhancer");
        Ok(Box::new(self.clone()))
    }

    async fn release_resources(&self, opts: &InferenceOptions) -> MediaResult<()> {
        Ok(self.release(opts).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MlClientConfig;
    use fswap_media::{InferenceHandles, MediaError};
    use fswap_models::{ExecutionProvider, JobOptions};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> MlClient {
        let config = MlClientConfig {
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            ..MlClientConfig::default()
        }
        .with_base_url(server.uri());
        MlClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_classifier_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unsafe": true, "score": 0.97})))
            .mount(&server)
            .await;

        let classifier: Box<dyn ContentSafetyClassifier> = Box::new(client(&server).await);
        assert!(classifier.is_unsafe(Path::new("/uploads/clip.mp4")).await.unwrap());
    }

    #[tokio::test]
    async fn test_service_errors_become_inference_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let analyser = client(&server).await;
        let err = analyser
            .detect_faces(Path::new("a.png"), &InferenceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Inference(msg) if msg.contains("model crashed")));
    }

    #[tokio::test]
    async fn test_handles_release_through_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/release"))
            .and(body_partial_json(json!({"options": {"execution_providers": ["cuda"]}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let handles = InferenceHandles::new(Arc::new(client(&server).await));
        let cpu = InferenceOptions::default();
        handles.release(&cpu).await.unwrap();

        let cuda = InferenceOptions::from_job(&JobOptions {
            execution_providers: vec![ExecutionProvider::Cuda],
            ..Default::default()
        });
        handles.release(&cuda).await.unwrap();
    }
}
