use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    AckToken, CandidateId, ClientError, Direction, Entitlement, JobId, JobKind, PollSeq,
    PollSnapshot, ProgressEvent, Ticket,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Screen mounted; entitlement gets loaded.
    ScreenOpened,
    /// User submitted a generation request.
    StartRequested { kind: JobKind, parameters: Value },
    /// Backend accepted a poll-tracked job.
    JobStarted { ticket: Ticket, job_id: JobId },
    StartFailed { ticket: Ticket, error: ClientError },
    /// Poll cadence tick from the caller's timer.
    PollTick,
    PollResponded {
        ticket: Ticket,
        seq: PollSeq,
        snapshot: PollSnapshot,
        received_at: DateTime<Utc>,
    },
    PollFailed {
        ticket: Ticket,
        seq: PollSeq,
        error: ClientError,
    },
    /// Next event from a progress stream, in transport order.
    StreamEventReceived {
        ticket: Ticket,
        event: ProgressEvent,
        received_at: DateTime<Utc>,
    },
    /// The stream connection broke or could not be opened.
    StreamFailed { ticket: Ticket, error: ClientError },
    /// User selected which job's review stack to work on.
    ReviewSelected { ticket: Ticket },
    /// Swipe on the active review stack.
    CandidateSwiped {
        candidate_id: CandidateId,
        direction: Direction,
    },
    /// User tapped a candidate in the gallery.
    CandidateOpened {
        ticket: Ticket,
        candidate_id: CandidateId,
    },
    AckSucceeded {
        ticket: Ticket,
        candidate_id: CandidateId,
        token: AckToken,
    },
    AckFailed {
        ticket: Ticket,
        candidate_id: CandidateId,
        token: AckToken,
        error: ClientError,
    },
    RestoreClicked,
    RetryClicked { ticket: Ticket },
    ExportClicked,
    EntitlementLoaded {
        entitlement: Entitlement,
        credits: Option<u32>,
    },
    NoticesDismissed,
    /// Screen torn down; every poll and stream must stop.
    ScreenClosed,
    /// Fallback for placeholder wiring.
    NoOp,
}
