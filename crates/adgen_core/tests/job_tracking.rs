use adgen_core::{ClientError, JobId, JobKind, JobStatus, PollApply, PollSnapshot, TrackedJob};
use pretty_assertions::assert_eq;
use serde_json::json;

fn snapshot(status: JobStatus, message: &str) -> PollSnapshot {
    PollSnapshot {
        status,
        progress_message: message.to_string(),
        result: None,
        error: None,
    }
}

fn job() -> TrackedJob {
    TrackedJob::new(JobId::new("job-7"), JobKind::DeepResearch)
}

#[test]
fn older_poll_answering_late_is_discarded() {
    let mut job = job();
    let first = job.issue_poll();
    let second = job.issue_poll();

    assert_eq!(
        job.apply_poll(second, snapshot(JobStatus::Running, "reading sources")),
        PollApply::Applied
    );
    assert_eq!(
        job.apply_poll(first, snapshot(JobStatus::Queued, "queued")),
        PollApply::Stale
    );
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.progress_message(), "reading sources");
    assert_eq!(job.last_applied_seq(), second);
}

#[test]
fn in_order_polls_apply_and_reach_completion() {
    let mut job = job();
    let s1 = job.issue_poll();
    assert_eq!(job.apply_poll(s1, snapshot(JobStatus::Queued, "")), PollApply::Applied);
    let s2 = job.issue_poll();
    assert_eq!(
        job.apply_poll(s2, snapshot(JobStatus::Running, "50%")),
        PollApply::Applied
    );
    let s3 = job.issue_poll();
    let done = PollSnapshot {
        result: Some(json!({"report": "ok"})),
        ..snapshot(JobStatus::Completed, "done")
    };
    assert_eq!(job.apply_poll(s3, done), PollApply::Applied);
    assert!(job.is_terminal());
    assert_eq!(job.result(), Some(&json!({"report": "ok"})));
}

#[test]
fn terminal_job_ignores_further_snapshots() {
    let mut job = job();
    let s1 = job.issue_poll();
    let failed = PollSnapshot {
        error: Some("provider outage".to_string()),
        ..snapshot(JobStatus::Failed, "")
    };
    assert_eq!(job.apply_poll(s1, failed), PollApply::Applied);

    let s2 = job.issue_poll();
    assert_eq!(
        job.apply_poll(s2, snapshot(JobStatus::Running, "again")),
        PollApply::Ignored
    );
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error(), Some("provider outage"));
}

#[test]
fn completed_without_result_is_not_applied() {
    let mut job = job();
    let s1 = job.issue_poll();
    assert_eq!(
        job.apply_poll(s1, snapshot(JobStatus::Completed, "done")),
        PollApply::Ignored
    );
    assert_eq!(job.status(), JobStatus::Queued);
    assert!(!job.is_terminal());
}

#[test]
fn applied_poll_resets_transient_failures() {
    let mut job = job();
    assert_eq!(job.record_transient_failure(), 1);
    assert_eq!(job.record_transient_failure(), 2);
    let seq = job.issue_poll();
    job.apply_poll(seq, snapshot(JobStatus::Running, ""));
    assert_eq!(job.consecutive_transient_failures(), 0);
}

#[test]
fn start_payloads_are_validated_per_kind() {
    let cases = [
        (
            JobKind::Campaign,
            json!({"brand_name": "Acme", "product_description": "Rockets"}),
            None,
        ),
        (
            JobKind::Campaign,
            json!({"brand_name": "  ", "product_description": "Rockets"}),
            Some("brand_name"),
        ),
        (
            JobKind::Campaign,
            json!({"brand_name": "Acme", "product_description": "x", "product_url": "not a url"}),
            Some("product_url"),
        ),
        (JobKind::PromptScoring, json!({"prompts": []}), Some("prompts")),
        (JobKind::PromptScoring, json!({"prompts": ["best shoes"]}), None),
        (JobKind::ImageSet, json!({"prompt": "cat", "count": 9}), Some("count")),
        (JobKind::DeepResearch, json!({"brand_name": "Acme", "competitors": [1]}), Some("competitors")),
        (JobKind::Video, json!({}), Some("script")),
        (JobKind::ImageSet, json!("cat"), Some("parameters")),
    ];

    for (kind, params, failing_field) in cases {
        let outcome = kind.validate(&params);
        match failing_field {
            None => assert_eq!(outcome, Ok(()), "{kind} {params}"),
            Some(expected) => match outcome {
                Err(ClientError::Validation { field, .. }) => assert_eq!(field, expected),
                other => panic!("{kind} {params}: expected validation error, got {other:?}"),
            },
        }
    }
}
