//! Remote operation client trait.

use crate::error::Result;
use crate::video::operation::{OperationHandle, OperationStatus};
use crate::video::types::GenerationRequest;
use async_trait::async_trait;

/// The remote side of a generation: submit, poll, fetch, cancel.
///
/// [`VeoClient`](crate::video::providers::VeoClient) talks to Google; tests
/// substitute stubs.
#[async_trait]
pub trait OperationClient: Send + Sync {
    /// Submits a request and returns the operation handle.
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle>;

    /// Fetches the current status of an operation.
    async fn status(&self, handle: &OperationHandle) -> Result<OperationStatus>;

    /// Downloads a video referenced by URI (`gs://` or HTTPS).
    async fn download(&self, uri: &str) -> Result<Vec<u8>>;

    /// Asks the service to cancel an operation. Best effort.
    async fn cancel(&self, handle: &OperationHandle) -> Result<()>;

    /// Checks that the endpoint is reachable and the credentials are accepted.
    async fn health_check(&self) -> Result<()>;

    /// Model identifier, for metadata.
    fn model_id(&self) -> &str;
}
