use std::path::PathBuf;

use adgen_core::{
    AckToken, CandidateId, ClientError, Direction, Entitlement, JobId, JobKind, JobStatus,
    PollSeq, PollSnapshot, ProgressEvent, Ticket,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StartRequest<'a> {
    pub kind: JobKind,
    pub parameters: &'a Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PollResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<PollResponse> for PollSnapshot {
    fn from(response: PollResponse) -> Self {
        PollSnapshot {
            status: response.status,
            progress_message: response.progress.unwrap_or_default(),
            result: response.result.filter(|value| !value.is_null()),
            error: response.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AckRequest<'a> {
    pub item_id: &'a CandidateId,
    pub action: Direction,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EntitlementResponse {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub credits: Option<u32>,
}

/// Entitlement plus the optional credit balance used for the pre-flight hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementInfo {
    pub entitlement: Entitlement,
    pub credits: Option<u32>,
}

impl From<EntitlementResponse> for EntitlementInfo {
    fn from(response: EntitlementResponse) -> Self {
        let entitlement = match response.plan.as_deref().map(str::trim) {
            None | Some("") | Some("free") => Entitlement::Free,
            Some(plan) => Entitlement::Paid {
                tier: response.tier.unwrap_or_else(|| plan.to_string()),
            },
        };
        EntitlementInfo {
            entitlement,
            credits: response.credits,
        }
    }
}

/// What to hand to the asset store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    File(PathBuf),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAsset {
    pub url: String,
    pub object_key: String,
}

/// Results the engine reports back to the caller, one per executed effect
/// (streams report once per event).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    EntitlementLoaded(Result<EntitlementInfo, ClientError>),
    JobStarted {
        ticket: Ticket,
        result: Result<JobId, ClientError>,
    },
    PollCompleted {
        ticket: Ticket,
        seq: PollSeq,
        result: Result<PollSnapshot, ClientError>,
        received_at: DateTime<Utc>,
    },
    StreamEvent {
        ticket: Ticket,
        event: ProgressEvent,
        received_at: DateTime<Utc>,
    },
    StreamFailed {
        ticket: Ticket,
        error: ClientError,
    },
    AckCompleted {
        ticket: Ticket,
        candidate_id: CandidateId,
        token: AckToken,
        result: Result<(), ClientError>,
    },
    ExportFinished {
        ticket: Ticket,
        result: Result<PathBuf, String>,
    },
}
