//! Oracle trait definition

use async_trait::async_trait;

use super::{GenerateRequest, OracleError};

/// Stateless text-generation capability
///
/// Each call is independent: the caller folds any conversation context into
/// the prompt itself. One implementation exists per backend and the backend is
/// chosen once, when the workflow is constructed.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one prompt and return the raw reply text
    async fn generate(&self, request: GenerateRequest) -> Result<String, OracleError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}
