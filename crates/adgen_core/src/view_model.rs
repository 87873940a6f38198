use crate::{
    CandidateId, Disposition, Entitlement, JobId, JobKind, JobPhase, JobStatus, Notice,
    StreamStage, Ticket,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub jobs: Vec<JobRowView>,
    pub review: Option<ReviewView>,
    /// Every candidate of every finished job, gated.
    pub gallery: Vec<GalleryItemView>,
    pub selected: Option<GalleryItemView>,
    pub entitlement: Entitlement,
    pub credits: Option<u32>,
    pub notices: Vec<Notice>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub ticket: Ticket,
    pub kind: JobKind,
    pub job_id: Option<JobId>,
    pub phase: JobPhase,
    /// Last status reported by polling; `None` for streamed jobs.
    pub status: Option<JobStatus>,
    /// Pipeline stage for streamed jobs.
    pub stage: Option<StreamStage>,
    pub image_progress: Option<u8>,
    pub progress_message: String,
    pub error: Option<String>,
    pub in_progress: bool,
    pub retry_available: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewView {
    pub ticket: Ticket,
    pub remaining_count: usize,
    pub saved_count: usize,
    pub rejected_count: usize,
    pub cursor: isize,
    pub top: Option<CandidateView>,
    pub can_restore: bool,
    /// Present once every candidate has been decided.
    pub reviewed: Option<Vec<CandidateView>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateView {
    pub id: CandidateId,
    pub ordinal: usize,
    pub score: Option<f64>,
    /// Withheld while locked.
    pub media_ref: Option<String>,
    pub disposition: Disposition,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryItemView {
    pub ticket: Ticket,
    pub candidate: CandidateView,
}
