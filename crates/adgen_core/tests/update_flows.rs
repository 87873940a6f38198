use std::sync::Once;

use adgen_core::{
    update, AppState, CandidateId, ClientError, Direction, Effect, Entitlement, JobId, JobKind,
    JobPhase, JobStatus, Msg, Notice, PollSnapshot, ProgressEvent, StateSettings, StreamStage,
    UpgradeReason,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(adgen_logging::initialize_for_tests);
}

fn step(state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    update(state, msg)
}

fn image_params() -> Value {
    json!({ "prompt": "sneaker on a beach", "count": 4 })
}

fn image_result(n: usize) -> Value {
    let images: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "id": format!("img-{i}"),
                "url": format!("https://cdn.example.com/{i}.png"),
                "created_at": format!("2024-06-01T10:00:0{i}Z"),
            })
        })
        .collect();
    json!({ "images": images })
}

fn snapshot(status: JobStatus, result: Option<Value>) -> PollSnapshot {
    PollSnapshot {
        status,
        progress_message: String::new(),
        result,
        error: None,
    }
}

fn received_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 5, 0).unwrap()
}

/// Starts an image job and walks it to `Tracking`; returns the ticket.
fn tracking_image_job() -> (AppState, u64) {
    let (state, effects) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::ImageSet,
            parameters: image_params(),
        },
    );
    let ticket = match effects.as_slice() {
        [Effect::StartJob { ticket, .. }] => *ticket,
        other => panic!("expected StartJob, got {other:?}"),
    };
    let (state, effects) = step(
        state,
        Msg::JobStarted {
            ticket,
            job_id: JobId::new("job-1"),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::PollJob {
            ticket,
            job_id: JobId::new("job-1"),
            seq: 1
        }]
    );
    (state, ticket)
}

/// Image job completed with `n` candidates and its review stack active.
fn reviewing(n: usize) -> (AppState, u64) {
    let (state, ticket) = tracking_image_job();
    let (state, _) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 1,
            snapshot: snapshot(JobStatus::Completed, Some(image_result(n))),
            received_at: received_at(),
        },
    );
    (state, ticket)
}

#[test]
fn screen_opened_fetches_entitlement() {
    let (_, effects) = step(AppState::new(), Msg::ScreenOpened);
    assert_eq!(effects, vec![Effect::FetchEntitlement]);
}

#[test]
fn noop_changes_nothing() {
    let mut state = AppState::new();
    state.consume_dirty();
    let (mut next, effects) = step(state.clone(), Msg::NoOp);
    assert!(effects.is_empty());
    assert!(!next.consume_dirty());
    assert_eq!(next, state);
}

#[test]
fn invalid_input_never_reaches_the_backend() {
    init_logging();
    let (state, effects) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::Campaign,
            parameters: json!({ "brand_name": "" }),
        },
    );
    assert!(effects.is_empty());
    assert!(state.tickets().is_empty());
    assert!(matches!(
        state.view().notices.as_slice(),
        [Notice::InvalidInput { .. }]
    ));
}

#[test]
fn campaign_subscribes_to_stream_and_other_kinds_poll() {
    init_logging();
    let params = json!({ "brand_name": "Acme", "product_description": "Rockets" });
    let (state, effects) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::Campaign,
            parameters: params.clone(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::SubscribeStream {
            ticket: 1,
            kind: JobKind::Campaign,
            parameters: params
        }]
    );
    assert_eq!(state.phase(1), Some(&JobPhase::Tracking));
    assert_eq!(state.stream(1).map(|s| s.stage()), Some(StreamStage::Preparing));
}

#[test]
fn quota_rejection_at_start_prompts_upgrade_and_creates_no_job() {
    init_logging();
    let (state, effects) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::ImageSet,
            parameters: image_params(),
        },
    );
    let Effect::StartJob { ticket, .. } = effects[0].clone() else {
        panic!("expected StartJob");
    };

    let (state, effects) = step(
        state,
        Msg::StartFailed {
            ticket,
            error: ClientError::QuotaExceeded {
                message: "Out of credits".to_string(),
            },
        },
    );

    assert_eq!(
        effects,
        vec![Effect::PromptUpgrade {
            reason: UpgradeReason::QuotaExceeded
        }]
    );
    assert!(state.tickets().is_empty());
    assert_eq!(
        state.view().notices,
        vec![Notice::QuotaExceeded {
            message: "Out of credits".to_string()
        }]
    );
}

#[test]
fn missing_credentials_at_start_request_sign_in() {
    init_logging();
    let (state, effects) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::ImageSet,
            parameters: image_params(),
        },
    );
    let Effect::StartJob { ticket, .. } = effects[0].clone() else {
        panic!("expected StartJob");
    };
    let (state, effects) = step(
        state,
        Msg::StartFailed {
            ticket,
            error: ClientError::Unauthenticated,
        },
    );
    assert_eq!(effects, vec![Effect::RequestCredentials]);
    assert!(state.tickets().is_empty());
    assert_eq!(state.view().notices, vec![Notice::SignInRequired]);
}

#[test]
fn low_credit_hint_blocks_start_before_network() {
    init_logging();
    let (state, _) = step(
        AppState::new(),
        Msg::EntitlementLoaded {
            entitlement: Entitlement::Free,
            credits: Some(1),
        },
    );
    let (state, effects) = step(
        state,
        Msg::StartRequested {
            kind: JobKind::Video,
            parameters: json!({ "script": "Meet the new sneaker." }),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::PromptUpgrade {
            reason: UpgradeReason::QuotaExceeded
        }]
    );
    assert!(state.tickets().is_empty());
}

#[test]
fn poll_tick_polls_only_tracking_jobs_with_increasing_seq() {
    init_logging();
    let (state, ticket) = tracking_image_job();
    let (state, effects) = step(state, Msg::PollTick);
    assert_eq!(
        effects,
        vec![Effect::PollJob {
            ticket,
            job_id: JobId::new("job-1"),
            seq: 2
        }]
    );

    let (state, _) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 2,
            snapshot: snapshot(JobStatus::Completed, Some(image_result(1))),
            received_at: received_at(),
        },
    );
    let (_, effects) = step(state, Msg::PollTick);
    assert!(effects.is_empty());
}

#[test]
fn stale_poll_response_is_discarded() {
    init_logging();
    let (state, ticket) = tracking_image_job();
    let (state, _) = step(state, Msg::PollTick);

    let (state, _) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 2,
            snapshot: snapshot(JobStatus::Running, None),
            received_at: received_at(),
        },
    );
    let (state, _) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 1,
            snapshot: snapshot(JobStatus::Queued, None),
            received_at: received_at(),
        },
    );
    assert_eq!(state.job(ticket).map(|j| j.status()), Some(JobStatus::Running));
}

#[test]
fn completion_seeds_review_and_gates_extra_items() {
    init_logging();
    let (state, ticket) = reviewing(4);

    assert_eq!(state.phase(ticket), Some(&JobPhase::Completed));
    let view = state.view();
    let review = view.review.expect("review active");
    assert_eq!(review.remaining_count, 4);
    assert_eq!(review.cursor, 3);

    let locked: Vec<_> = view
        .gallery
        .iter()
        .filter(|item| item.candidate.locked)
        .map(|item| item.candidate.id.clone())
        .collect();
    assert_eq!(locked, vec![CandidateId::new("img-2"), CandidateId::new("img-3")]);
    assert!(view
        .gallery
        .iter()
        .filter(|item| item.candidate.locked)
        .all(|item| item.candidate.media_ref.is_none()));
}

#[test]
fn entitlement_change_unlocks_without_reload() {
    init_logging();
    let (state, _) = reviewing(4);
    let (state, _) = step(
        state,
        Msg::EntitlementLoaded {
            entitlement: Entitlement::Paid {
                tier: "pro".to_string(),
            },
            credits: Some(100),
        },
    );
    assert!(state.view().gallery.iter().all(|item| !item.candidate.locked));
}

#[test]
fn swiping_a_locked_candidate_prompts_upgrade() {
    init_logging();
    let (state, _) = reviewing(3);
    let (state, effects) = step(
        state,
        Msg::CandidateSwiped {
            candidate_id: CandidateId::new("img-2"),
            direction: Direction::Accept,
        },
    );
    assert_eq!(
        effects,
        vec![Effect::PromptUpgrade {
            reason: UpgradeReason::LockedCandidate
        }]
    );
    assert_eq!(state.view().review.map(|r| r.remaining_count), Some(3));
}

/// Completes a second image job whose results are `ids`, oldest first.
fn complete_image_job(state: AppState, job_id: &str, ids: &[&str]) -> (AppState, u64) {
    let (state, effects) = step(
        state,
        Msg::StartRequested {
            kind: JobKind::ImageSet,
            parameters: image_params(),
        },
    );
    let ticket = match effects.as_slice() {
        [Effect::StartJob { ticket, .. }] => *ticket,
        other => panic!("expected StartJob, got {other:?}"),
    };
    let (state, _) = step(
        state,
        Msg::JobStarted {
            ticket,
            job_id: JobId::new(job_id),
        },
    );
    let images: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            json!({
                "id": id,
                "url": format!("https://cdn.example.com/{job_id}/{id}.png"),
                "created_at": format!("2024-06-01T10:00:0{i}Z"),
            })
        })
        .collect();
    let (state, _) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 1,
            snapshot: snapshot(JobStatus::Completed, Some(json!({ "images": images }))),
            received_at: received_at(),
        },
    );
    (state, ticket)
}

#[test]
fn same_ids_in_two_jobs_are_gated_per_job() {
    init_logging();
    let (state, first) = complete_image_job(AppState::new(), "job-a", &["img-2", "img-3"]);
    let (state, second) =
        complete_image_job(state, "job-b", &["img-0", "img-1", "img-2", "img-3"]);
    assert_ne!(first, second);

    let view = state.view();
    let locked: Vec<_> = view
        .gallery
        .iter()
        .filter(|item| item.candidate.locked)
        .map(|item| (item.ticket, item.candidate.id.clone()))
        .collect();
    assert_eq!(
        locked,
        vec![
            (second, CandidateId::new("img-2")),
            (second, CandidateId::new("img-3")),
        ]
    );
    assert!(view
        .gallery
        .iter()
        .filter(|item| item.ticket == first)
        .all(|item| item.candidate.media_ref.is_some()));

    let (state, effects) = step(
        state,
        Msg::CandidateOpened {
            ticket: second,
            candidate_id: CandidateId::new("img-3"),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::PromptUpgrade {
            reason: UpgradeReason::LockedCandidate
        }]
    );

    let (state, effects) = step(
        state,
        Msg::CandidateOpened {
            ticket: first,
            candidate_id: CandidateId::new("img-3"),
        },
    );
    assert!(effects.is_empty());
    let selected = state.view().selected.expect("free item opens");
    assert_eq!(selected.ticket, first);
    assert!(!selected.candidate.locked);

    let (state, _) = step(state, Msg::ReviewSelected { ticket: first });
    let (_, effects) = step(
        state,
        Msg::CandidateSwiped {
            candidate_id: CandidateId::new("img-2"),
            direction: Direction::Accept,
        },
    );
    assert!(
        matches!(effects.as_slice(), [Effect::AckDisposal { ticket, .. }] if *ticket == first),
        "got {effects:?}"
    );
}

#[test]
fn swipe_emits_ack_and_failed_ack_rolls_back() {
    init_logging();
    let (state, ticket) = reviewing(2);
    let (state, effects) = step(
        state,
        Msg::CandidateSwiped {
            candidate_id: CandidateId::new("img-0"),
            direction: Direction::Reject,
        },
    );
    let token = match effects.as_slice() {
        [Effect::AckDisposal {
            ticket: t,
            candidate_id,
            direction: Direction::Reject,
            token,
        }] if *t == ticket && candidate_id == &CandidateId::new("img-0") => *token,
        other => panic!("expected AckDisposal, got {other:?}"),
    };
    assert_eq!(state.view().review.map(|r| r.rejected_count), Some(1));

    let (state, effects) = step(
        state,
        Msg::AckFailed {
            ticket,
            candidate_id: CandidateId::new("img-0"),
            token,
            error: ClientError::DisposalAckFailure {
                message: "503".to_string(),
            },
        },
    );
    assert!(effects.is_empty());
    let view = state.view();
    let review = view.review.expect("review active");
    assert_eq!(review.rejected_count, 0);
    assert_eq!(review.top.map(|c| c.id), Some(CandidateId::new("img-0")));
    assert!(matches!(
        view.notices.as_slice(),
        [Notice::DisposalRolledBack { .. }]
    ));
}

#[test]
fn export_is_offered_once_every_candidate_is_decided() {
    init_logging();
    let (state, ticket) = reviewing(2);
    let (state, effects) = step(state, Msg::ExportClicked);
    assert!(effects.is_empty());

    let (state, _) = step(
        state,
        Msg::CandidateSwiped {
            candidate_id: CandidateId::new("img-1"),
            direction: Direction::Accept,
        },
    );
    let (state, _) = step(
        state,
        Msg::CandidateSwiped {
            candidate_id: CandidateId::new("img-0"),
            direction: Direction::Reject,
        },
    );
    let (_, effects) = step(state, Msg::ExportClicked);
    match effects.as_slice() {
        [Effect::ExportSaved {
            ticket: t,
            kind: JobKind::ImageSet,
            job_id,
            candidates,
        }] => {
            assert_eq!(*t, ticket);
            assert_eq!(job_id, &JobId::new("job-1"));
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].id, CandidateId::new("img-1"));
        }
        other => panic!("expected ExportSaved, got {other:?}"),
    }
}

#[test]
fn transient_poll_failures_are_silent_until_budget() {
    init_logging();
    let settings = StateSettings {
        transient_retry_budget: 3,
        ..StateSettings::default()
    };
    let (state, effects) = step(
        AppState::with_settings(settings),
        Msg::StartRequested {
            kind: JobKind::PromptScoring,
            parameters: json!({ "prompts": ["best running shoes"] }),
        },
    );
    let Effect::StartJob { ticket, .. } = effects[0].clone() else {
        panic!("expected StartJob");
    };
    let (mut state, _) = step(
        state,
        Msg::JobStarted {
            ticket,
            job_id: JobId::new("job-9"),
        },
    );

    for seq in 1..=2 {
        let (next, effects) = step(
            state,
            Msg::PollFailed {
                ticket,
                seq,
                error: ClientError::transient("connection reset"),
            },
        );
        assert!(effects.is_empty());
        assert!(next.view().notices.is_empty());
        assert_eq!(next.phase(ticket), Some(&JobPhase::Tracking));
        state = next;
    }

    let (state, _) = step(
        state,
        Msg::PollFailed {
            ticket,
            seq: 3,
            error: ClientError::transient("connection reset"),
        },
    );
    assert!(matches!(state.phase(ticket), Some(JobPhase::Halted { .. })));
    assert_eq!(state.view().notices, vec![Notice::ConnectionLost { ticket }]);

    let (state, effects) = step(state, Msg::RetryClicked { ticket });
    assert_eq!(
        effects,
        vec![Effect::PollJob {
            ticket,
            job_id: JobId::new("job-9"),
            seq: 2
        }]
    );
    assert_eq!(state.phase(ticket), Some(&JobPhase::Tracking));
}

#[test]
fn retrying_a_failed_job_starts_it_again() {
    init_logging();
    let (state, ticket) = tracking_image_job();
    let failed = PollSnapshot {
        error: Some("provider outage".to_string()),
        ..snapshot(JobStatus::Failed, None)
    };
    let (state, _) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 1,
            snapshot: failed,
            received_at: received_at(),
        },
    );
    assert_eq!(
        state.phase(ticket),
        Some(&JobPhase::Failed {
            message: "provider outage".to_string()
        })
    );

    let (state, effects) = step(state, Msg::RetryClicked { ticket });
    assert_eq!(
        effects,
        vec![Effect::StartJob {
            ticket: ticket + 1,
            kind: JobKind::ImageSet,
            parameters: image_params()
        }]
    );
    assert_eq!(state.tickets(), vec![ticket + 1]);
}

#[test]
fn stream_error_fails_job_and_cancels_tracking() {
    init_logging();
    let params = json!({ "brand_name": "Acme", "product_description": "Rockets" });
    let (state, _) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::Campaign,
            parameters: params,
        },
    );
    let (state, _) = step(
        state,
        Msg::StreamEventReceived {
            ticket: 1,
            event: ProgressEvent::ScriptsStart,
            received_at: received_at(),
        },
    );
    let (state, effects) = step(
        state,
        Msg::StreamEventReceived {
            ticket: 1,
            event: ProgressEvent::Error {
                message: "render farm down".to_string(),
            },
            received_at: received_at(),
        },
    );
    assert_eq!(effects, vec![Effect::CancelTracking { ticket: 1 }]);
    assert_eq!(state.stream(1).map(|s| s.stage()), Some(StreamStage::Failed));

    let (state, effects) = step(
        state,
        Msg::StreamEventReceived {
            ticket: 1,
            event: ProgressEvent::ImagesStart { total: Some(2) },
            received_at: received_at(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.stream(1).map(|s| s.stage()), Some(StreamStage::Failed));
}

fn subscribed_campaign() -> AppState {
    let params = json!({ "brand_name": "Acme", "product_description": "Rockets" });
    let (state, _) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::Campaign,
            parameters: params,
        },
    );
    state
}

#[test]
fn campaign_refused_for_quota_prompts_upgrade_without_retry() {
    init_logging();
    let (state, effects) = step(
        subscribed_campaign(),
        Msg::StreamFailed {
            ticket: 1,
            error: ClientError::QuotaExceeded {
                message: "out of credits".to_string(),
            },
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::CancelTracking { ticket: 1 },
            Effect::PromptUpgrade {
                reason: UpgradeReason::QuotaExceeded
            },
        ]
    );
    assert!(state.tickets().is_empty());
    assert_eq!(
        state.view().notices,
        vec![Notice::QuotaExceeded {
            message: "out of credits".to_string()
        }]
    );

    let (state, effects) = step(state, Msg::RetryClicked { ticket: 1 });
    assert!(effects.is_empty());
    assert!(state.tickets().is_empty());
}

#[test]
fn campaign_refused_for_credentials_requests_sign_in() {
    init_logging();
    let (state, effects) = step(
        subscribed_campaign(),
        Msg::StreamFailed {
            ticket: 1,
            error: ClientError::Unauthenticated,
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::CancelTracking { ticket: 1 },
            Effect::RequestCredentials
        ]
    );
    assert!(state.tickets().is_empty());
    assert_eq!(state.view().notices, vec![Notice::SignInRequired]);

    let (_, effects) = step(
        state,
        Msg::StreamEventReceived {
            ticket: 1,
            event: ProgressEvent::Start,
            received_at: received_at(),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn dropped_stream_connection_stays_a_retryable_failure() {
    init_logging();
    let (state, effects) = step(
        subscribed_campaign(),
        Msg::StreamFailed {
            ticket: 1,
            error: ClientError::StreamError {
                message: "connection closed before completion".to_string(),
            },
        },
    );
    assert_eq!(effects, vec![Effect::CancelTracking { ticket: 1 }]);
    assert!(matches!(state.phase(1), Some(JobPhase::Failed { .. })));
    assert!(state.view().jobs[0].retry_available);
}

#[test]
fn stream_completion_seeds_campaign_review() {
    init_logging();
    let params = json!({ "brand_name": "Acme", "product_description": "Rockets" });
    let (state, _) = step(
        AppState::new(),
        Msg::StartRequested {
            kind: JobKind::Campaign,
            parameters: params,
        },
    );
    let (state, _) = step(
        state,
        Msg::StreamEventReceived {
            ticket: 1,
            event: ProgressEvent::Complete {
                result: Some(json!({ "ads": [{ "id": "ad-1" }, { "id": "ad-2" }] })),
            },
            received_at: received_at(),
        },
    );
    assert_eq!(state.phase(1), Some(&JobPhase::Completed));
    assert_eq!(state.review(1).map(|q| q.remaining_count()), Some(2));
}

#[test]
fn screen_closed_cancels_in_flight_work_and_ignores_late_results() {
    init_logging();
    let (state, ticket) = tracking_image_job();
    let (state, _) = step(
        state,
        Msg::StartRequested {
            kind: JobKind::Campaign,
            parameters: json!({ "brand_name": "Acme", "product_description": "Rockets" }),
        },
    );

    let (state, effects) = step(state, Msg::ScreenClosed);
    assert_eq!(
        effects,
        vec![
            Effect::CancelTracking { ticket },
            Effect::CancelTracking { ticket: ticket + 1 }
        ]
    );

    let (state, effects) = step(
        state,
        Msg::PollResponded {
            ticket,
            seq: 1,
            snapshot: snapshot(JobStatus::Completed, Some(image_result(2))),
            received_at: received_at(),
        },
    );
    assert!(effects.is_empty());
    assert!(state.view().jobs.is_empty());
    assert!(state.view().review.is_none());
}

#[test]
fn restore_after_swipe_puts_candidate_back() {
    init_logging();
    let (state, _) = reviewing(2);
    let (state, _) = step(
        state,
        Msg::CandidateSwiped {
            candidate_id: CandidateId::new("img-1"),
            direction: Direction::Accept,
        },
    );
    let (mut state, _) = step(state, Msg::RestoreClicked);
    assert!(state.consume_dirty());
    let review = state.view().review.expect("review active");
    assert_eq!(review.saved_count, 0);
    assert_eq!(review.top.map(|c| c.id), Some(CandidateId::new("img-1")));
}
