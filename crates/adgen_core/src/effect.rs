use serde_json::Value;

use crate::{AckToken, Candidate, CandidateId, Direction, JobId, JobKind, PollSeq, Ticket};

/// Work the reducer asks the outside world to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchEntitlement,
    StartJob {
        ticket: Ticket,
        kind: JobKind,
        parameters: Value,
    },
    PollJob {
        ticket: Ticket,
        job_id: JobId,
        seq: PollSeq,
    },
    SubscribeStream {
        ticket: Ticket,
        kind: JobKind,
        parameters: Value,
    },
    /// Tear down any poll or stream still running for the ticket.
    CancelTracking { ticket: Ticket },
    AckDisposal {
        ticket: Ticket,
        candidate_id: CandidateId,
        direction: Direction,
        token: AckToken,
    },
    PromptUpgrade { reason: UpgradeReason },
    RequestCredentials,
    ExportSaved {
        ticket: Ticket,
        kind: JobKind,
        job_id: JobId,
        candidates: Vec<Candidate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeReason {
    QuotaExceeded,
    LockedCandidate,
}
