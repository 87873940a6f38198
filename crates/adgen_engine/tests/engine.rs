use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adgen_core::{
    CandidateId, ClientError, Direction, Effect, Entitlement, JobId, JobKind, JobStatus,
    PollSnapshot,
};
use adgen_engine::{
    ByteStream, ClientSettings, DisposalAcker, EngineEvent, EngineHandle, EngineServices, EntitlementInfo,
    EntitlementSource, EventSource, JobBackend,
};
use bytes::Bytes;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Default)]
struct FakeService {
    acked: Mutex<Vec<(CandidateId, Direction)>>,
}

#[async_trait::async_trait]
impl JobBackend for FakeService {
    async fn start(&self, _kind: JobKind, _parameters: &Value) -> Result<JobId, ClientError> {
        Ok(JobId::new("job-e1"))
    }

    async fn poll(&self, job_id: &JobId) -> Result<PollSnapshot, ClientError> {
        if job_id.as_str() == "job-slow" {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(PollSnapshot {
            status: JobStatus::Running,
            progress_message: "halfway".to_string(),
            result: None,
            error: None,
        })
    }
}

#[async_trait::async_trait]
impl EventSource for FakeService {
    async fn open(&self, _kind: JobKind, _parameters: &Value) -> Result<ByteStream, ClientError> {
        let body = "event: start\ndata: {}\n\nevent: complete\ndata: {\"ads\":[]}\n\n";
        Ok(futures_util::stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))]).boxed())
    }
}

#[async_trait::async_trait]
impl DisposalAcker for FakeService {
    async fn acknowledge(
        &self,
        candidate_id: &CandidateId,
        direction: Direction,
    ) -> Result<(), ClientError> {
        self.acked
            .lock()
            .unwrap()
            .push((candidate_id.clone(), direction));
        if candidate_id.as_str() == "flaky" {
            return Err(ClientError::DisposalAckFailure {
                message: "503".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntitlementSource for FakeService {
    async fn entitlement(&self) -> Result<EntitlementInfo, ClientError> {
        Ok(EntitlementInfo {
            entitlement: Entitlement::Free,
            credits: Some(3),
        })
    }
}

fn engine(service: Arc<FakeService>, export_dir: &TempDir) -> EngineHandle {
    let services = EngineServices {
        jobs: service.clone(),
        events: service.clone(),
        acker: service.clone(),
        entitlement: service,
    };
    EngineHandle::with_services(
        services,
        &ClientSettings::default(),
        export_dir.path().to_path_buf(),
    )
    .expect("engine")
}

fn next_event(engine: &EngineHandle) -> EngineEvent {
    engine
        .recv_timeout(Duration::from_secs(5))
        .expect("engine event")
}

#[test]
fn start_and_poll_effects_report_back() {
    let dir = TempDir::new().unwrap();
    let engine = engine(Arc::new(FakeService::default()), &dir);

    engine.execute(Effect::StartJob {
        ticket: 1,
        kind: JobKind::ImageSet,
        parameters: json!({ "prompt": "red shoe" }),
    });
    assert_eq!(
        next_event(&engine),
        EngineEvent::JobStarted {
            ticket: 1,
            result: Ok(JobId::new("job-e1"))
        }
    );

    engine.execute(Effect::PollJob {
        ticket: 1,
        job_id: JobId::new("job-e1"),
        seq: 1,
    });
    match next_event(&engine) {
        EngineEvent::PollCompleted {
            ticket: 1,
            seq: 1,
            result: Ok(snapshot),
            ..
        } => assert_eq!(snapshot.progress_message, "halfway"),
        other => panic!("unexpected {other:?}"),
    }
    engine.shutdown();
}

#[test]
fn start_with_invalid_parameters_reports_validation_error() {
    let dir = TempDir::new().unwrap();
    let engine = engine(Arc::new(FakeService::default()), &dir);
    engine.execute(Effect::StartJob {
        ticket: 4,
        kind: JobKind::ImageSet,
        parameters: json!({}),
    });
    match next_event(&engine) {
        EngineEvent::JobStarted {
            ticket: 4,
            result: Err(ClientError::Validation { field, .. }),
        } => assert_eq!(field, "prompt"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn cancelled_poll_reports_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = engine(Arc::new(FakeService::default()), &dir);

    engine.execute(Effect::PollJob {
        ticket: 2,
        job_id: JobId::new("job-slow"),
        seq: 1,
    });
    engine.execute(Effect::CancelTracking { ticket: 2 });

    assert_eq!(engine.recv_timeout(Duration::from_millis(300)), None);
}

#[test]
fn stream_events_are_forwarded_in_order() {
    let dir = TempDir::new().unwrap();
    let engine = engine(Arc::new(FakeService::default()), &dir);
    engine.execute(Effect::SubscribeStream {
        ticket: 3,
        kind: JobKind::Campaign,
        parameters: json!({ "brand_name": "Acme", "product_description": "Rockets" }),
    });

    let mut names = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while names.len() < 2 && Instant::now() < deadline {
        if let Some(EngineEvent::StreamEvent { ticket: 3, event, .. }) =
            engine.recv_timeout(Duration::from_millis(100))
        {
            names.push(event.name().to_string());
        }
    }
    assert_eq!(names, vec!["start", "complete"]);
}

#[test]
fn ack_results_carry_the_token() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeService::default());
    let engine = engine(service.clone(), &dir);

    engine.execute(Effect::AckDisposal {
        ticket: 1,
        candidate_id: CandidateId::new("flaky"),
        direction: Direction::Accept,
        token: 9,
    });
    match next_event(&engine) {
        EngineEvent::AckCompleted {
            ticket: 1,
            candidate_id,
            token: 9,
            result: Err(ClientError::DisposalAckFailure { .. }),
        } => assert_eq!(candidate_id, CandidateId::new("flaky")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        *service.acked.lock().unwrap(),
        vec![(CandidateId::new("flaky"), Direction::Accept)]
    );
}

#[test]
fn entitlement_and_export_effects_complete() {
    let dir = TempDir::new().unwrap();
    let engine = engine(Arc::new(FakeService::default()), &dir);

    engine.execute(Effect::FetchEntitlement);
    assert_eq!(
        next_event(&engine),
        EngineEvent::EntitlementLoaded(Ok(EntitlementInfo {
            entitlement: Entitlement::Free,
            credits: Some(3),
        }))
    );

    let candidates = vec![adgen_core::Candidate::new("ad-1", 0, chrono::Utc::now())];
    engine.execute(Effect::ExportSaved {
        ticket: 1,
        kind: JobKind::Campaign,
        job_id: JobId::new("local-1"),
        candidates,
    });
    match next_event(&engine) {
        EngineEvent::ExportFinished {
            ticket: 1,
            result: Ok(path),
        } => assert!(path.starts_with(dir.path())),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn front_end_effects_are_ignored() {
    let dir = TempDir::new().unwrap();
    let engine = engine(Arc::new(FakeService::default()), &dir);
    engine.execute(Effect::RequestCredentials);
    engine.execute(Effect::PromptUpgrade {
        reason: adgen_core::UpgradeReason::LockedCandidate,
    });
    assert_eq!(engine.recv_timeout(Duration::from_millis(100)), None);
}
