use super::{EmbeddingError, EmbeddingSource, EmbeddingTensor, UploadImage};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl EmbeddingConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Embedding precompute service over HTTP.
///
/// The Upload-space image bytes are POSTed as the raw body; the reply is a
/// JSON array whose first element is the base64 of the f32 tensor.
pub struct HttpEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

/// Pull the tensor out of the service's JSON reply
pub fn parse_response(body: &[u8]) -> Result<EmbeddingTensor, EmbeddingError> {
    let payload: Vec<String> = serde_json::from_slice(body)?;
    let encoded = payload.first().ok_or(EmbeddingError::EmptyResponse)?;
    EmbeddingTensor::from_base64(encoded)
}

#[async_trait]
impl EmbeddingSource for HttpEmbeddingClient {
    async fn fetch(&self, image: &UploadImage) -> Result<EmbeddingTensor, EmbeddingError> {
        tracing::info!(
            "Requesting embedding for {}x{} upload from {}",
            image.width,
            image.height,
            self.config.endpoint
        );

        let response = self
            .client
            .post(self.config.endpoint.as_str())
            .body(image.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let tensor = parse_response(&body)?;
        tracing::debug!("Embedding received ({} bytes)", body.len());
        Ok(tensor)
    }
}

/// Precomputed embedding stored as raw little-endian f32 on disk
pub struct FileEmbeddingSource {
    path: PathBuf,
}

impl FileEmbeddingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EmbeddingSource for FileEmbeddingSource {
    async fn fetch(&self, _image: &UploadImage) -> Result<EmbeddingTensor, EmbeddingError> {
        tracing::info!("Reading embedding from {}", self.path.display());
        let bytes = tokio::fs::read(&self.path).await?;
        EmbeddingTensor::from_le_bytes(&bytes)
    }
}
