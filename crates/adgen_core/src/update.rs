use adgen_logging::{adgen_debug, adgen_info, adgen_warn};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::effect::UpgradeReason;
use crate::state::JobEntry;
use crate::{
    AckOutcome, AppState, ClientError, Effect, JobKind, JobPhase, JobStatus, Msg, Notice,
    PollApply, StreamStep, Ticket, TrackedJob, TrackingMode,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::ScreenOpened => vec![Effect::FetchEntitlement],
        Msg::StartRequested { kind, parameters } => start_job(&mut state, kind, parameters),
        Msg::JobStarted { ticket, job_id } => {
            let Some(entry) = state.job_entry_mut(ticket) else {
                return (state, Vec::new());
            };
            if entry.phase != JobPhase::Starting {
                return (state, Vec::new());
            }
            adgen_info!("ticket {ticket}: backend accepted {} as {job_id}", entry.kind);
            let mut job = TrackedJob::new(job_id.clone(), entry.kind);
            let seq = job.issue_poll();
            entry.remote = Some(job);
            entry.phase = JobPhase::Tracking;
            state.mark_dirty();
            vec![Effect::PollJob {
                ticket,
                job_id,
                seq,
            }]
        }
        Msg::StartFailed { ticket, error } => start_failed(&mut state, ticket, error),
        Msg::PollTick => {
            let mut effects = Vec::new();
            for (ticket, entry) in state.job_entries_mut() {
                if entry.phase != JobPhase::Tracking {
                    continue;
                }
                if let Some(job) = entry.remote.as_mut().filter(|job| !job.is_terminal()) {
                    let seq = job.issue_poll();
                    effects.push(Effect::PollJob {
                        ticket: *ticket,
                        job_id: job.id().clone(),
                        seq,
                    });
                }
            }
            effects
        }
        Msg::PollResponded {
            ticket,
            seq,
            snapshot,
            received_at,
        } => poll_responded(&mut state, ticket, seq, snapshot, received_at),
        Msg::PollFailed { ticket, seq, error } => poll_failed(&mut state, ticket, seq, error),
        Msg::StreamEventReceived {
            ticket,
            event,
            received_at,
        } => {
            let Some(entry) = state.job_entry_mut(ticket) else {
                return (state, Vec::new());
            };
            let Some(stream) = entry.stream.as_mut() else {
                return (state, Vec::new());
            };
            let step = stream.apply(event);
            stream_step(&mut state, ticket, step, received_at)
        }
        Msg::StreamFailed { ticket, error } => {
            let Some(stream) = state
                .job_entry_mut(ticket)
                .and_then(|entry| entry.stream.as_mut())
            else {
                return (state, Vec::new());
            };
            if stream.is_closed() {
                return (state, Vec::new());
            }
            match error {
                ClientError::QuotaExceeded { .. } | ClientError::Unauthenticated => {
                    stream.cancel();
                    adgen_warn!("ticket {ticket}: stream refused: {error}");
                    let mut effects = vec![Effect::CancelTracking { ticket }];
                    effects.extend(account_refusal(&mut state, ticket, error));
                    effects
                }
                other => match stream.fail(other.to_string()) {
                    StreamStep::Failed(message) => stream_failure(&mut state, ticket, message),
                    _ => Vec::new(),
                },
            }
        }
        Msg::ReviewSelected { ticket } => {
            state.set_active_review(ticket);
            Vec::new()
        }
        Msg::CandidateSwiped {
            candidate_id,
            direction,
        } => {
            let Some(ticket) = state.active_review() else {
                return (state, Vec::new());
            };
            if state.is_locked(ticket, &candidate_id) {
                state.push_notice(Notice::LockedContent { candidate_id });
                return (
                    state,
                    vec![Effect::PromptUpgrade {
                        reason: UpgradeReason::LockedCandidate,
                    }],
                );
            }
            let Some(queue) = state.review_mut(ticket) else {
                return (state, Vec::new());
            };
            match queue.dispose(&candidate_id, direction) {
                Some(disposal) => {
                    state.mark_dirty();
                    vec![Effect::AckDisposal {
                        ticket,
                        candidate_id: disposal.candidate_id,
                        direction: disposal.direction,
                        token: disposal.token,
                    }]
                }
                None => Vec::new(),
            }
        }
        Msg::CandidateOpened {
            ticket,
            candidate_id,
        } => {
            let known = state
                .review(ticket)
                .is_some_and(|queue| queue.get(&candidate_id).is_some());
            if !known {
                return (state, Vec::new());
            }
            if state.is_locked(ticket, &candidate_id) {
                state.push_notice(Notice::LockedContent { candidate_id });
                vec![Effect::PromptUpgrade {
                    reason: UpgradeReason::LockedCandidate,
                }]
            } else {
                state.select(ticket, candidate_id);
                Vec::new()
            }
        }
        Msg::AckSucceeded {
            ticket,
            candidate_id,
            token,
        } => {
            if let Some(queue) = state.review_mut(ticket) {
                if queue.ack_succeeded(&candidate_id, token) == AckOutcome::Superseded {
                    adgen_debug!("ticket {ticket}: late ack for {candidate_id} ignored");
                }
            }
            Vec::new()
        }
        Msg::AckFailed {
            ticket,
            candidate_id,
            token,
            error,
        } => {
            let Some(queue) = state.review_mut(ticket) else {
                return (state, Vec::new());
            };
            match queue.ack_failed(&candidate_id, token) {
                AckOutcome::RolledBack { candidate_id } => {
                    state.push_notice(Notice::DisposalRolledBack {
                        candidate_id,
                        message: error.to_string(),
                    });
                    if error == ClientError::Unauthenticated {
                        vec![Effect::RequestCredentials]
                    } else {
                        Vec::new()
                    }
                }
                AckOutcome::Confirmed | AckOutcome::Superseded => Vec::new(),
            }
        }
        Msg::RestoreClicked => {
            let restored = state
                .active_review()
                .and_then(|ticket| state.review_mut(ticket))
                .and_then(|queue| queue.restore());
            if restored.is_some() {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::RetryClicked { ticket } => retry(&mut state, ticket),
        Msg::ExportClicked => {
            let Some(ticket) = state.active_review() else {
                return (state, Vec::new());
            };
            let Some((kind, job_id)) = state.job_kind_and_id(ticket) else {
                return (state, Vec::new());
            };
            let candidates = state
                .review(ticket)
                .and_then(|queue| queue.reviewed_view())
                .map(|reviewed| reviewed.saved.into_iter().cloned().collect::<Vec<_>>());
            match candidates {
                Some(candidates) => vec![Effect::ExportSaved {
                    ticket,
                    kind,
                    job_id,
                    candidates,
                }],
                None => Vec::new(),
            }
        }
        Msg::EntitlementLoaded {
            entitlement,
            credits,
        } => {
            state.set_entitlement(entitlement, credits);
            Vec::new()
        }
        Msg::NoticesDismissed => {
            state.clear_notices();
            Vec::new()
        }
        Msg::ScreenClosed => {
            let mut effects = Vec::new();
            for (ticket, mut entry) in state.clear_jobs() {
                if let Some(stream) = entry.stream.as_mut() {
                    stream.cancel();
                }
                if entry.phase.in_progress() {
                    effects.push(Effect::CancelTracking { ticket });
                }
            }
            adgen_info!("screen closed, cancelled {} job(s)", effects.len());
            effects
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn start_job(state: &mut AppState, kind: JobKind, parameters: Value) -> Vec<Effect> {
    if let Err(err) = kind.validate(&parameters) {
        state.push_notice(Notice::InvalidInput {
            message: err.to_string(),
        });
        return Vec::new();
    }

    // Best-effort hint only; the server's answer at start time is authoritative.
    if let Some(credits) = state.credits_hint() {
        if credits < kind.credit_cost() {
            state.push_notice(Notice::QuotaExceeded {
                message: format!(
                    "{kind} needs {} credits, {credits} left",
                    kind.credit_cost()
                ),
            });
            return vec![Effect::PromptUpgrade {
                reason: UpgradeReason::QuotaExceeded,
            }];
        }
    }

    let ticket = state.insert_job(kind, parameters.clone());
    adgen_info!("ticket {ticket}: starting {kind}");
    match kind.tracking() {
        TrackingMode::Poll => vec![Effect::StartJob {
            ticket,
            kind,
            parameters,
        }],
        TrackingMode::Stream => vec![Effect::SubscribeStream {
            ticket,
            kind,
            parameters,
        }],
    }
}

fn start_failed(state: &mut AppState, ticket: Ticket, error: ClientError) -> Vec<Effect> {
    if state.phase(ticket) != Some(&JobPhase::Starting) {
        return Vec::new();
    }
    adgen_warn!("ticket {ticket}: start failed: {error}");
    match error {
        ClientError::Unauthenticated | ClientError::QuotaExceeded { .. } => {
            account_refusal(state, ticket, error)
        }
        ClientError::Validation { .. } => {
            state.remove_job(ticket);
            state.push_notice(Notice::InvalidInput {
                message: error.to_string(),
            });
            Vec::new()
        }
        other => {
            let message = other.to_string();
            set_phase(state, ticket, JobPhase::Failed {
                message: message.clone(),
            });
            state.push_notice(Notice::JobFailed { ticket, message });
            Vec::new()
        }
    }
}

/// The service refused the job for account reasons. No job is kept, so
/// nothing is retried; the user is sent to sign in or upgrade instead.
fn account_refusal(state: &mut AppState, ticket: Ticket, error: ClientError) -> Vec<Effect> {
    state.remove_job(ticket);
    match error {
        ClientError::QuotaExceeded { message } => {
            state.push_notice(Notice::QuotaExceeded { message });
            vec![Effect::PromptUpgrade {
                reason: UpgradeReason::QuotaExceeded,
            }]
        }
        _ => {
            state.push_notice(Notice::SignInRequired);
            vec![Effect::RequestCredentials]
        }
    }
}

fn poll_responded(
    state: &mut AppState,
    ticket: Ticket,
    seq: u64,
    snapshot: crate::PollSnapshot,
    received_at: DateTime<Utc>,
) -> Vec<Effect> {
    let Some(entry) = state.job_entry_mut(ticket) else {
        return Vec::new();
    };
    if entry.phase != JobPhase::Tracking {
        return Vec::new();
    }
    let Some(job) = entry.remote.as_mut() else {
        return Vec::new();
    };
    if job.apply_poll(seq, snapshot) != PollApply::Applied {
        return Vec::new();
    }

    let status = job.status();
    let result = job.result().cloned();
    let error = job.error().map(ToOwned::to_owned);
    let progress = job.progress_message().to_string();
    state.mark_dirty();

    match status {
        JobStatus::Queued | JobStatus::Running => Vec::new(),
        JobStatus::Completed | JobStatus::Partial => {
            let phase = if status == JobStatus::Completed {
                JobPhase::Completed
            } else {
                JobPhase::Partial
            };
            set_phase(state, ticket, phase);
            if let Some(result) = result {
                let count = state.seed_review(ticket, &result, received_at);
                adgen_info!("ticket {ticket}: {status:?} with {count} candidate(s)");
            }
            Vec::new()
        }
        JobStatus::Failed => {
            let message = error
                .or_else(|| (!progress.is_empty()).then_some(progress))
                .unwrap_or_else(|| "generation failed".to_string());
            adgen_warn!("ticket {ticket}: job failed: {message}");
            set_phase(state, ticket, JobPhase::Failed {
                message: message.clone(),
            });
            state.push_notice(Notice::JobFailed { ticket, message });
            Vec::new()
        }
    }
}

fn poll_failed(state: &mut AppState, ticket: Ticket, seq: u64, error: ClientError) -> Vec<Effect> {
    let budget = state.settings().transient_retry_budget;
    let Some(entry) = state.job_entry_mut(ticket) else {
        return Vec::new();
    };
    if entry.phase != JobPhase::Tracking {
        return Vec::new();
    }
    let Some(job) = entry.remote.as_mut() else {
        return Vec::new();
    };

    match error {
        ClientError::TransientNetwork { .. } | ClientError::Protocol { .. } => {
            let failures = job.record_transient_failure();
            if failures < budget {
                adgen_debug!("ticket {ticket}: poll #{seq} failed ({error}), retrying next tick");
                return Vec::new();
            }
            adgen_warn!("ticket {ticket}: {failures} consecutive poll failures, giving up");
            set_phase(state, ticket, JobPhase::Halted {
                message: error.to_string(),
            });
            state.push_notice(Notice::ConnectionLost { ticket });
            Vec::new()
        }
        ClientError::Unauthenticated => {
            set_phase(state, ticket, JobPhase::Halted {
                message: error.to_string(),
            });
            state.push_notice(Notice::SignInRequired);
            vec![Effect::RequestCredentials]
        }
        other => {
            let message = other.to_string();
            adgen_warn!("ticket {ticket}: poll #{seq} rejected: {message}");
            set_phase(state, ticket, JobPhase::Failed {
                message: message.clone(),
            });
            state.push_notice(Notice::JobFailed { ticket, message });
            Vec::new()
        }
    }
}

fn stream_step(
    state: &mut AppState,
    ticket: Ticket,
    step: StreamStep,
    received_at: DateTime<Utc>,
) -> Vec<Effect> {
    match step {
        StreamStep::Advanced => {
            state.mark_dirty();
            Vec::new()
        }
        StreamStep::Completed(result) => {
            set_phase(state, ticket, JobPhase::Completed);
            let count = state.seed_review(ticket, &result, received_at);
            adgen_info!("ticket {ticket}: stream complete with {count} candidate(s)");
            Vec::new()
        }
        StreamStep::Failed(message) => stream_failure(state, ticket, message),
        StreamStep::Ignored | StreamStep::Closed => Vec::new(),
    }
}

fn stream_failure(state: &mut AppState, ticket: Ticket, message: String) -> Vec<Effect> {
    adgen_warn!("ticket {ticket}: stream failed: {message}");
    set_phase(state, ticket, JobPhase::Failed {
        message: message.clone(),
    });
    state.push_notice(Notice::StreamFailed { ticket, message });
    vec![Effect::CancelTracking { ticket }]
}

fn retry(state: &mut AppState, ticket: Ticket) -> Vec<Effect> {
    let Some(phase) = state.phase(ticket).cloned() else {
        return Vec::new();
    };
    match phase {
        JobPhase::Failed { .. } => {
            // Failed jobs never resume; start over under a new ticket.
            let Some(JobEntry {
                kind, parameters, ..
            }) = state.remove_job(ticket)
            else {
                return Vec::new();
            };
            start_job(state, kind, parameters)
        }
        JobPhase::Halted { .. } => {
            let Some(entry) = state.job_entry_mut(ticket) else {
                return Vec::new();
            };
            let Some(job) = entry.remote.as_mut() else {
                return Vec::new();
            };
            job.reset_transient_failures();
            let seq = job.issue_poll();
            let job_id = job.id().clone();
            entry.phase = JobPhase::Tracking;
            state.mark_dirty();
            vec![Effect::PollJob {
                ticket,
                job_id,
                seq,
            }]
        }
        JobPhase::Starting | JobPhase::Tracking | JobPhase::Completed | JobPhase::Partial => {
            Vec::new()
        }
    }
}

fn set_phase(state: &mut AppState, ticket: Ticket, phase: JobPhase) {
    if let Some(entry) = state.job_entry_mut(ticket) {
        entry.phase = phase;
        state.mark_dirty();
    }
}
