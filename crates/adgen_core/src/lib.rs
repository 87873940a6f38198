//! Adgen core: pure job, stream, review and gating state plus the screen reducer.
mod candidate;
mod effect;
mod error;
mod gating;
mod job;
mod msg;
mod progress;
mod review;
mod state;
mod update;
mod view_model;

pub use candidate::{candidates_from_result, Candidate, CandidateId, Direction, Disposition};
pub use effect::{Effect, UpgradeReason};
pub use error::ClientError;
pub use gating::{apply as apply_gating, Entitlement, GatingPolicy, DEFAULT_FREE_ITEMS_PER_JOB};
pub use job::{
    JobId, JobKind, JobStatus, PollApply, PollSeq, PollSnapshot, TrackedJob, TrackingMode,
};
pub use msg::Msg;
pub use progress::{ProgressEvent, ProgressStream, StreamStage, StreamStep};
pub use review::{AckOutcome, AckToken, Disposal, ReviewQueue, ReviewedView};
pub use state::{
    AppState, JobPhase, Notice, StateSettings, Ticket, DEFAULT_TRANSIENT_RETRY_BUDGET,
};
pub use update::update;
pub use view_model::{AppViewModel, CandidateView, GalleryItemView, JobRowView, ReviewView};
