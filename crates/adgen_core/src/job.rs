use std::fmt;

use adgen_logging::{adgen_debug, adgen_warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::ClientError;

/// Server-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequence number attached to every outgoing poll of one job.
pub type PollSeq = u64;

/// How a screen follows a job of a given kind to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Poll,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Campaign,
    DeepResearch,
    PromptScoring,
    ImageSet,
    Video,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Campaign,
        JobKind::DeepResearch,
        JobKind::PromptScoring,
        JobKind::ImageSet,
        JobKind::Video,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            JobKind::Campaign => "campaign",
            JobKind::DeepResearch => "deep_research",
            JobKind::PromptScoring => "prompt_scoring",
            JobKind::ImageSet => "image_set",
            JobKind::Video => "video",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == normalized)
    }

    pub fn tracking(self) -> TrackingMode {
        match self {
            JobKind::Campaign => TrackingMode::Stream,
            JobKind::DeepResearch
            | JobKind::PromptScoring
            | JobKind::ImageSet
            | JobKind::Video => TrackingMode::Poll,
        }
    }

    /// Credits the service charges for one job. Only used as a pre-flight hint.
    pub fn credit_cost(self) -> u32 {
        match self {
            JobKind::Campaign => 5,
            JobKind::DeepResearch => 3,
            JobKind::PromptScoring => 1,
            JobKind::ImageSet => 2,
            JobKind::Video => 8,
        }
    }

    /// Key of the candidate array inside a completed result, if the kind yields any.
    pub fn candidate_field(self) -> Option<&'static str> {
        match self {
            JobKind::Campaign => Some("ads"),
            JobKind::DeepResearch => None,
            JobKind::PromptScoring => Some("prompts"),
            JobKind::ImageSet => Some("images"),
            JobKind::Video => Some("videos"),
        }
    }

    /// Checks the start payload locally. Runs before any network call.
    pub fn validate(self, parameters: &Value) -> Result<(), ClientError> {
        let params = parameters
            .as_object()
            .ok_or_else(|| ClientError::validation("parameters", "must be a JSON object"))?;
        match self {
            JobKind::Campaign => {
                require_text(params, "brand_name")?;
                require_text(params, "product_description")?;
                optional_url(params, "product_url")?;
                optional_range(params, "ad_count", 1, 20)
            }
            JobKind::DeepResearch => {
                require_text(params, "brand_name")?;
                match params.get("competitors") {
                    None | Some(Value::Null) => Ok(()),
                    Some(Value::Array(items)) if items.iter().all(Value::is_string) => Ok(()),
                    Some(_) => Err(ClientError::validation(
                        "competitors",
                        "must be an array of strings",
                    )),
                }
            }
            JobKind::PromptScoring => {
                let prompts = params
                    .get("prompts")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ClientError::validation("prompts", "required array"))?;
                if prompts.is_empty() {
                    return Err(ClientError::validation("prompts", "must not be empty"));
                }
                let all_text = prompts
                    .iter()
                    .all(|p| p.as_str().is_some_and(|s| !s.trim().is_empty()));
                if !all_text {
                    return Err(ClientError::validation(
                        "prompts",
                        "every prompt must be a non-empty string",
                    ));
                }
                Ok(())
            }
            JobKind::ImageSet => {
                require_text(params, "prompt")?;
                optional_range(params, "count", 1, 8)
            }
            JobKind::Video => {
                let has_script = params
                    .get("script")
                    .and_then(Value::as_str)
                    .is_some_and(|s| !s.trim().is_empty());
                if !has_script {
                    match params.get("image_url") {
                        Some(Value::String(_)) => optional_url(params, "image_url")?,
                        _ => {
                            return Err(ClientError::validation(
                                "script",
                                "a script or an image_url is required",
                            ))
                        }
                    }
                }
                optional_range(params, "duration_seconds", 5, 60)
            }
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

fn require_text(params: &Map<String, Value>, field: &str) -> Result<(), ClientError> {
    match params.get(field).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(()),
        Some(_) => Err(ClientError::validation(field, "must not be empty")),
        None => Err(ClientError::validation(field, "required")),
    }
}

fn optional_url(params: &Map<String, Value>, field: &str) -> Result<(), ClientError> {
    let Some(value) = params.get(field) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let raw = value
        .as_str()
        .ok_or_else(|| ClientError::validation(field, "must be a string"))?;
    let parsed = Url::parse(raw.trim())
        .map_err(|err| ClientError::validation(field, format!("not a valid URL ({err})")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::validation(field, "must be an http(s) URL"));
    }
    Ok(())
}

fn optional_range(
    params: &Map<String, Value>,
    field: &str,
    min: u64,
    max: u64,
) -> Result<(), ClientError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(value) => match value.as_u64() {
            Some(n) if (min..=max).contains(&n) => Ok(()),
            _ => Err(ClientError::validation(
                field,
                format!("must be an integer between {min} and {max}"),
            )),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    /// Terminal, but the result is still usable.
    Partial,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }

    /// Forward-only transitions; refreshing the same status is allowed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (a, b) if a == b => true,
            (JobStatus::Queued, _) => true,
            (JobStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// One poll answer as seen by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot {
    pub status: JobStatus,
    pub progress_message: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollApply {
    Applied,
    /// An older request answered after a newer one was applied.
    Stale,
    /// The snapshot would move the job backwards or out of a terminal state.
    Ignored,
}

/// Client-side record of one remote job: status machine plus poll ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    id: JobId,
    kind: JobKind,
    status: JobStatus,
    progress_message: String,
    result: Option<Value>,
    error: Option<String>,
    next_seq: PollSeq,
    last_applied_seq: PollSeq,
    consecutive_transient_failures: u32,
}

impl TrackedJob {
    pub fn new(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            progress_message: String::new(),
            result: None,
            error: None,
            next_seq: 0,
            last_applied_seq: 0,
            consecutive_transient_failures: 0,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress_message(&self) -> &str {
        &self.progress_message
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_applied_seq(&self) -> PollSeq {
        self.last_applied_seq
    }

    pub fn consecutive_transient_failures(&self) -> u32 {
        self.consecutive_transient_failures
    }

    /// Reserves the sequence number for the next outgoing poll.
    pub fn issue_poll(&mut self) -> PollSeq {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn apply_poll(&mut self, seq: PollSeq, snapshot: PollSnapshot) -> PollApply {
        if seq < self.last_applied_seq {
            adgen_debug!(
                "job {}: dropping stale poll #{} (last applied #{})",
                self.id,
                seq,
                self.last_applied_seq
            );
            return PollApply::Stale;
        }
        if !self.status.can_transition_to(snapshot.status) {
            adgen_debug!(
                "job {}: ignoring {:?} -> {:?} from poll #{}",
                self.id,
                self.status,
                snapshot.status,
                seq
            );
            return PollApply::Ignored;
        }
        if snapshot.status == JobStatus::Completed && snapshot.result.is_none() {
            adgen_warn!(
                "job {}: completed without a result, waiting for next poll",
                self.id
            );
            return PollApply::Ignored;
        }

        self.last_applied_seq = seq;
        self.consecutive_transient_failures = 0;
        self.status = snapshot.status;
        self.progress_message = snapshot.progress_message;
        if snapshot.result.is_some() {
            self.result = snapshot.result;
        }
        if snapshot.error.is_some() {
            self.error = snapshot.error;
        }
        PollApply::Applied
    }

    /// Counts a swallowed network failure; returns the running total.
    pub fn record_transient_failure(&mut self) -> u32 {
        self.consecutive_transient_failures += 1;
        self.consecutive_transient_failures
    }

    pub fn reset_transient_failures(&mut self) {
        self.consecutive_transient_failures = 0;
    }
}
