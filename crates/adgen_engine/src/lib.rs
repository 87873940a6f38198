//! Adgen engine: service client, job tracking, progress streams and effect execution.
mod backend;
mod config;
mod credentials;
mod engine;
mod export;
mod http;
mod persist;
mod sse;
mod stream;
mod tracker;
mod types;

pub use backend::{AssetStore, ByteStream, DisposalAcker, EntitlementSource, EventSource, JobBackend};
pub use config::{ClientSettings, DEFAULT_BASE_URL};
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials, TOKEN_ENV_VAR};
pub use engine::{EngineError, EngineHandle, EngineServices};
pub use export::{export_filename, export_saved, ExportError, ExportSummary};
pub use http::HttpApi;
pub use persist::{ensure_export_dir, AtomicFileWriter, PersistError};
pub use sse::{SseDecoder, SseFrame};
pub use stream::{ProgressStreamConsumer, StreamSink, StreamSubscription};
pub use tracker::JobTracker;
pub use types::{AssetSource, EngineEvent, EntitlementInfo, UploadedAsset};
