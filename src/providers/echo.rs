//! Offline provider that answers without calling any model.

use async_trait::async_trait;

use super::traits::{CompletionRequest, ModelOptions, Provider, ServiceError};

/// Replies `This is a response to: <query>`. Useful for demos and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        _options: &ModelOptions,
    ) -> Result<String, ServiceError> {
        Ok(format!("This is a response to: {}", request.query))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
