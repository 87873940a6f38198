//! Service boundaries. `HttpApi` implements all of them; tests swap in fakes.

use adgen_core::{CandidateId, ClientError, Direction, JobId, JobKind, PollSnapshot};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::{AssetSource, EntitlementInfo, UploadedAsset};

/// Raw body chunks of an open event stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

#[async_trait::async_trait]
pub trait JobBackend: Send + Sync {
    async fn start(&self, kind: JobKind, parameters: &Value) -> Result<JobId, ClientError>;

    async fn poll(&self, job_id: &JobId) -> Result<PollSnapshot, ClientError>;
}

#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Opens the progress stream for a new job of `kind`.
    async fn open(&self, kind: JobKind, parameters: &Value) -> Result<ByteStream, ClientError>;
}

#[async_trait::async_trait]
pub trait DisposalAcker: Send + Sync {
    async fn acknowledge(
        &self,
        candidate_id: &CandidateId,
        direction: Direction,
    ) -> Result<(), ClientError>;
}

#[async_trait::async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn entitlement(&self) -> Result<EntitlementInfo, ClientError>;
}

#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, source: AssetSource, folder: &str)
        -> Result<UploadedAsset, ClientError>;
}
