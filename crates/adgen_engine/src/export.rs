//! Writes the saved candidates of a finished review as a JSON manifest.

use std::path::{Path, PathBuf};

use adgen_core::{Candidate, JobId, JobKind};
use adgen_logging::adgen_info;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("manifest encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub item_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    kind: JobKind,
    job_id: &'a JobId,
    exported_at: String,
    count: usize,
    items: Vec<ManifestItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestItem<'a> {
    id: &'a str,
    ordinal: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_ref: Option<&'a str>,
    created_at: String,
    metadata: &'a Value,
}

/// Writes `candidates` (in the given order) to `dir`, replacing an earlier
/// export of the same job.
pub fn export_saved(
    dir: &Path,
    kind: JobKind,
    job_id: &JobId,
    candidates: &[Candidate],
    exported_at: DateTime<Utc>,
) -> Result<ExportSummary, ExportError> {
    if candidates.is_empty() {
        return Err(ExportError::Empty);
    }
    let manifest = Manifest {
        kind,
        job_id,
        exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        count: candidates.len(),
        items: candidates
            .iter()
            .map(|candidate| ManifestItem {
                id: candidate.id.as_str(),
                ordinal: candidate.ordinal,
                score: candidate.score,
                media_ref: candidate.media_ref.as_deref(),
                created_at: candidate
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                metadata: &candidate.metadata,
            })
            .collect(),
    };
    let body = serde_json::to_vec_pretty(&manifest)?;
    let path = AtomicFileWriter::new(dir).write(&export_filename(kind, job_id), &body)?;
    adgen_info!("exported {} {kind} item(s) to {}", candidates.len(), path.display());
    Ok(ExportSummary {
        path,
        item_count: candidates.len(),
    })
}

/// `{kind}--{sanitized_job_id}--{short_hash(job_id)}.json`; stable per job and
/// safe on Windows.
pub fn export_filename(kind: JobKind, job_id: &JobId) -> String {
    format!(
        "{}--{}--{}.json",
        kind.wire_name(),
        sanitize(job_id.as_str()),
        short_hash(job_id.as_str())
    )
}

fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let c = if is_forbidden(c) || c.is_whitespace() { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let mut out = out.trim_matches(&['_', '.', ' '][..]).to_string();
    if out.is_empty() {
        out.push_str("job");
    }
    if out.len() > 60 {
        let mut cut = 60;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).map(|byte| format!("{byte:02x}")).collect()
}
