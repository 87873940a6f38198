use std::fmt;

use adgen_logging::adgen_warn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{JobId, JobKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    Undecided,
    Saved,
    Rejected,
}

/// Swipe direction; also the `action` of a disposal acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Accept,
    Reject,
}

impl Direction {
    pub fn disposition(self) -> Disposition {
        match self {
            Direction::Accept => Disposition::Saved,
            Direction::Reject => Disposition::Rejected,
        }
    }
}

/// One generated artifact awaiting triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Position in the delivered result set.
    pub ordinal: usize,
    pub score: Option<f64>,
    pub media_ref: Option<String>,
    pub metadata: Value,
    pub disposition: Disposition,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, ordinal: usize, created_at: DateTime<Utc>) -> Self {
        Self {
            id: CandidateId::new(id),
            ordinal,
            score: None,
            media_ref: None,
            metadata: Value::Null,
            disposition: Disposition::Undecided,
            created_at,
        }
    }
}

/// Extracts the candidate set from a completed job result.
///
/// Items that are not JSON objects are skipped. Missing ids are derived from
/// the job id and position, missing timestamps fall back to `completed_at`.
pub fn candidates_from_result(
    kind: JobKind,
    job_id: &JobId,
    result: &Value,
    completed_at: DateTime<Utc>,
) -> Vec<Candidate> {
    let Some(field) = kind.candidate_field() else {
        return Vec::new();
    };
    let Some(items) = result.get(field).and_then(Value::as_array) else {
        adgen_warn!("job {job_id}: result has no `{field}` array");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(ordinal, item)| {
            let obj = item.as_object()?;
            let id = match obj.get("id") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => format!("{job_id}-{ordinal}"),
            };
            let created_at = obj
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(completed_at);
            let media_ref = ["media_url", "url", "image_url", "video_url"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(ToOwned::to_owned);
            Some(Candidate {
                id: CandidateId(id),
                ordinal,
                score: obj.get("score").and_then(Value::as_f64),
                media_ref,
                metadata: item.clone(),
                disposition: Disposition::Undecided,
                created_at,
            })
        })
        .collect()
}
