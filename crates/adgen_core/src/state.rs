use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::view_model::{AppViewModel, CandidateView, GalleryItemView, JobRowView, ReviewView};
use crate::{
    candidates_from_result, Candidate, CandidateId, Entitlement, GatingPolicy, JobId, JobKind,
    ProgressStream, ReviewQueue, TrackedJob, TrackingMode, DEFAULT_FREE_ITEMS_PER_JOB,
};

/// Local handle for a job, assigned before the server knows about it.
pub type Ticket = u64;

pub const DEFAULT_TRANSIENT_RETRY_BUDGET: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSettings {
    pub free_items_per_job: usize,
    /// Consecutive swallowed poll failures before the user is told.
    pub transient_retry_budget: u32,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            free_items_per_job: DEFAULT_FREE_ITEMS_PER_JOB,
            transient_retry_budget: DEFAULT_TRANSIENT_RETRY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Starting,
    Tracking,
    Completed,
    /// Terminal with a usable but incomplete result.
    Partial,
    Failed { message: String },
    /// Tracking stopped without a terminal status; retry resumes polling.
    Halted { message: String },
}

impl JobPhase {
    pub fn in_progress(&self) -> bool {
        matches!(self, JobPhase::Starting | JobPhase::Tracking)
    }

    pub fn retry_available(&self) -> bool {
        matches!(self, JobPhase::Failed { .. } | JobPhase::Halted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    InvalidInput { message: String },
    SignInRequired,
    QuotaExceeded { message: String },
    JobFailed { ticket: Ticket, message: String },
    StreamFailed { ticket: Ticket, message: String },
    ConnectionLost { ticket: Ticket },
    DisposalRolledBack { candidate_id: CandidateId, message: String },
    LockedContent { candidate_id: CandidateId },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JobEntry {
    pub(crate) kind: JobKind,
    pub(crate) parameters: Value,
    pub(crate) phase: JobPhase,
    pub(crate) remote: Option<TrackedJob>,
    pub(crate) stream: Option<ProgressStream>,
}

impl JobEntry {
    fn new(kind: JobKind, parameters: Value) -> Self {
        let stream = match kind.tracking() {
            TrackingMode::Stream => Some(ProgressStream::new()),
            TrackingMode::Poll => None,
        };
        let phase = match kind.tracking() {
            TrackingMode::Stream => JobPhase::Tracking,
            TrackingMode::Poll => JobPhase::Starting,
        };
        Self {
            kind,
            parameters,
            phase,
            remote: None,
            stream,
        }
    }

    /// Server id, or a stable local stand-in for streamed jobs.
    pub(crate) fn job_id(&self, ticket: Ticket) -> JobId {
        match &self.remote {
            Some(job) => job.id().clone(),
            None => JobId::new(format!("local-{ticket}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    jobs: BTreeMap<Ticket, JobEntry>,
    reviews: BTreeMap<Ticket, ReviewQueue>,
    active_review: Option<Ticket>,
    selected: Option<(Ticket, CandidateId)>,
    next_ticket: Ticket,
    entitlement: Entitlement,
    credits_hint: Option<u32>,
    gating: GatingPolicy,
    settings: StateSettings,
    notices: Vec<Notice>,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_settings(StateSettings::default())
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: StateSettings) -> Self {
        Self {
            jobs: BTreeMap::new(),
            reviews: BTreeMap::new(),
            active_review: None,
            selected: None,
            next_ticket: 1,
            entitlement: Entitlement::Free,
            credits_hint: None,
            gating: GatingPolicy::new(settings.free_items_per_job),
            settings,
            notices: Vec::new(),
            dirty: false,
        }
    }

    /// Returns whether the view changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn review(&self, ticket: Ticket) -> Option<&ReviewQueue> {
        self.reviews.get(&ticket)
    }

    pub fn active_review(&self) -> Option<Ticket> {
        self.active_review
    }

    pub fn job(&self, ticket: Ticket) -> Option<&TrackedJob> {
        self.jobs.get(&ticket).and_then(|entry| entry.remote.as_ref())
    }

    pub fn stream(&self, ticket: Ticket) -> Option<&ProgressStream> {
        self.jobs.get(&ticket).and_then(|entry| entry.stream.as_ref())
    }

    pub fn phase(&self, ticket: Ticket) -> Option<&JobPhase> {
        self.jobs.get(&ticket).map(|entry| &entry.phase)
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.jobs.keys().copied().collect()
    }

    /// Locked candidate ids per job. Recomputed on every call; the item set
    /// and entitlement both feed it.
    pub fn locked_candidates(&self) -> BTreeMap<Ticket, HashSet<CandidateId>> {
        self.reviews
            .iter()
            .map(|(ticket, queue)| (*ticket, self.locked_in(queue)))
            .collect()
    }

    /// Ids only need to be unique within one job.
    pub fn is_locked(&self, ticket: Ticket, candidate_id: &CandidateId) -> bool {
        self.reviews
            .get(&ticket)
            .is_some_and(|queue| self.locked_in(queue).contains(candidate_id))
    }

    fn locked_in(&self, queue: &ReviewQueue) -> HashSet<CandidateId> {
        self.gating
            .apply([queue.all_candidates()], &self.entitlement)
    }

    pub fn view(&self) -> AppViewModel {
        let locked_by_job = self.locked_candidates();
        let unlocked = HashSet::new();
        let locked_in = |ticket: Ticket| locked_by_job.get(&ticket).unwrap_or(&unlocked);

        let jobs = self
            .jobs
            .iter()
            .map(|(ticket, entry)| job_row(*ticket, entry))
            .collect();

        let review = self.active_review.and_then(|ticket| {
            let queue = self.reviews.get(&ticket)?;
            Some(ReviewView {
                ticket,
                remaining_count: queue.remaining_count(),
                saved_count: queue.saved_count(),
                rejected_count: queue.rejected_count(),
                cursor: queue.cursor(),
                top: queue.top().map(|c| candidate_view(c, locked_in(ticket))),
                can_restore: queue.can_restore(),
                reviewed: queue.reviewed_view().map(|reviewed| {
                    reviewed
                        .saved
                        .into_iter()
                        .map(|c| candidate_view(c, locked_in(ticket)))
                        .collect()
                }),
            })
        });

        let gallery = self
            .reviews
            .iter()
            .flat_map(|(ticket, queue)| {
                let locked = locked_in(*ticket);
                queue
                    .all_candidates()
                    .into_iter()
                    .map(move |c| GalleryItemView {
                        ticket: *ticket,
                        candidate: candidate_view(c, locked),
                    })
            })
            .collect();

        let selected = self.selected.as_ref().and_then(|(ticket, id)| {
            let candidate = self.reviews.get(ticket)?.get(id)?;
            Some(GalleryItemView {
                ticket: *ticket,
                candidate: candidate_view(candidate, locked_in(*ticket)),
            })
        });

        AppViewModel {
            jobs,
            review,
            gallery,
            selected,
            entitlement: self.entitlement.clone(),
            credits: self.credits_hint,
            notices: self.notices.clone(),
            dirty: self.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn settings(&self) -> StateSettings {
        self.settings
    }

    pub(crate) fn credits_hint(&self) -> Option<u32> {
        self.credits_hint
    }

    pub(crate) fn set_entitlement(&mut self, entitlement: Entitlement, credits: Option<u32>) {
        self.entitlement = entitlement;
        self.credits_hint = credits;
        self.dirty = true;
    }

    pub(crate) fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
        self.dirty = true;
    }

    pub(crate) fn clear_notices(&mut self) {
        if !self.notices.is_empty() {
            self.notices.clear();
            self.dirty = true;
        }
    }

    pub(crate) fn insert_job(&mut self, kind: JobKind, parameters: Value) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.jobs.insert(ticket, JobEntry::new(kind, parameters));
        self.dirty = true;
        ticket
    }

    pub(crate) fn job_entry_mut(&mut self, ticket: Ticket) -> Option<&mut JobEntry> {
        self.jobs.get_mut(&ticket)
    }

    pub(crate) fn job_entries_mut(&mut self) -> impl Iterator<Item = (&Ticket, &mut JobEntry)> {
        self.jobs.iter_mut()
    }

    pub(crate) fn remove_job(&mut self, ticket: Ticket) -> Option<JobEntry> {
        self.reviews.remove(&ticket);
        if self.active_review == Some(ticket) {
            self.active_review = self.reviews.keys().next_back().copied();
        }
        if matches!(self.selected, Some((t, _)) if t == ticket) {
            self.selected = None;
        }
        self.dirty = true;
        self.jobs.remove(&ticket)
    }

    /// Drops every job and review; used on teardown.
    pub(crate) fn clear_jobs(&mut self) -> Vec<(Ticket, JobEntry)> {
        self.reviews.clear();
        self.active_review = None;
        self.selected = None;
        self.dirty = true;
        std::mem::take(&mut self.jobs).into_iter().collect()
    }

    /// Seeds a review stack from a completed result; returns the candidate count.
    pub(crate) fn seed_review(
        &mut self,
        ticket: Ticket,
        result: &Value,
        completed_at: DateTime<Utc>,
    ) -> usize {
        let Some(entry) = self.jobs.get(&ticket) else {
            return 0;
        };
        let job_id = entry.job_id(ticket);
        let candidates: Vec<Candidate> =
            candidates_from_result(entry.kind, &job_id, result, completed_at);
        if candidates.is_empty() {
            return 0;
        }
        let count = candidates.len();
        self.reviews
            .insert(ticket, ReviewQueue::initialize(candidates));
        self.active_review = Some(ticket);
        self.dirty = true;
        count
    }

    pub(crate) fn review_mut(&mut self, ticket: Ticket) -> Option<&mut ReviewQueue> {
        self.reviews.get_mut(&ticket)
    }

    pub(crate) fn set_active_review(&mut self, ticket: Ticket) -> bool {
        if !self.reviews.contains_key(&ticket) || self.active_review == Some(ticket) {
            return false;
        }
        self.active_review = Some(ticket);
        self.dirty = true;
        true
    }

    pub(crate) fn select(&mut self, ticket: Ticket, candidate_id: CandidateId) {
        self.selected = Some((ticket, candidate_id));
        self.dirty = true;
    }

    pub(crate) fn job_kind_and_id(&self, ticket: Ticket) -> Option<(JobKind, JobId)> {
        self.jobs
            .get(&ticket)
            .map(|entry| (entry.kind, entry.job_id(ticket)))
    }
}

fn job_row(ticket: Ticket, entry: &JobEntry) -> JobRowView {
    let stream = entry.stream.as_ref();
    let progress_message = match (&entry.remote, stream) {
        (Some(job), _) => job.progress_message().to_string(),
        (None, Some(stream)) => match stream.current_image() {
            Some(name) => format!("rendering {name}"),
            None => String::new(),
        },
        (None, None) => String::new(),
    };
    let error = match &entry.phase {
        JobPhase::Failed { message } | JobPhase::Halted { message } => Some(message.clone()),
        _ => None,
    };
    JobRowView {
        ticket,
        kind: entry.kind,
        job_id: entry.remote.as_ref().map(|job| job.id().clone()),
        status: entry.remote.as_ref().map(TrackedJob::status),
        stage: stream.map(ProgressStream::stage),
        image_progress: stream.and_then(ProgressStream::image_progress),
        progress_message,
        in_progress: entry.phase.in_progress(),
        retry_available: entry.phase.retry_available(),
        phase: entry.phase.clone(),
        error,
    }
}

fn candidate_view(candidate: &Candidate, locked: &HashSet<CandidateId>) -> CandidateView {
    let is_locked = locked.contains(&candidate.id);
    CandidateView {
        id: candidate.id.clone(),
        ordinal: candidate.ordinal,
        score: candidate.score,
        media_ref: if is_locked {
            None
        } else {
            candidate.media_ref.clone()
        },
        disposition: candidate.disposition,
        locked: is_locked,
    }
}
