pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use super::LlmConfig;
use self::openai::OpenAICompatibleClient;

/// A single-shot completion: one system instruction, one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("credential cannot be sent as a header: {0}")]
    InvalidCredential(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed completion payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("completion service returned no content")]
    EmptyCompletion,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        credential: &str,
        request: &CompletionRequest
    ) -> Result<String, ClientError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn CompletionService>, ClientError> {
    let client = OpenAICompatibleClient::from_config(config)?;
    Ok(Arc::new(client))
}
