use std::sync::Arc;
use std::time::Duration;

use adgen_core::{ClientError, JobId, JobKind, PollApply, PollSeq, PollSnapshot, TrackedJob};
use adgen_logging::{adgen_debug, adgen_info, adgen_warn};
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::JobBackend;
use crate::ClientSettings;

/// Start-and-poll lifecycle for one remote job.
///
/// Polls are issued on a fixed cadence without waiting for earlier ones, and
/// every answer goes through the [`TrackedJob`] sequence gate, so a slow
/// response never overwrites a newer one.
#[derive(Clone)]
pub struct JobTracker {
    backend: Arc<dyn JobBackend>,
    poll_interval: Duration,
    transient_retry_budget: u32,
}

impl JobTracker {
    pub fn new(backend: Arc<dyn JobBackend>, settings: &ClientSettings) -> Self {
        Self {
            backend,
            poll_interval: settings.poll_interval,
            transient_retry_budget: settings.transient_retry_budget.max(1),
        }
    }

    /// Validates `parameters` locally, then asks the service to start the job.
    pub async fn start(&self, kind: JobKind, parameters: &Value) -> Result<JobId, ClientError> {
        kind.validate(parameters)?;
        let job_id = self.backend.start(kind, parameters).await?;
        adgen_info!("{kind} job {job_id} started");
        Ok(job_id)
    }

    pub async fn poll(&self, job_id: &JobId) -> Result<PollSnapshot, ClientError> {
        self.backend.poll(job_id).await
    }

    /// Polls until the job is terminal.
    ///
    /// `on_update` sees the job after every applied snapshot and never after
    /// `cancel` fires. Transient failures are swallowed until the retry budget
    /// runs out; any other error ends tracking.
    pub async fn track<F>(
        &self,
        job_id: JobId,
        kind: JobKind,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<TrackedJob, ClientError>
    where
        F: FnMut(&TrackedJob) + Send,
    {
        let mut job = TrackedJob::new(job_id, kind);
        let mut in_flight: JoinSet<(PollSeq, Result<PollSnapshot, ClientError>)> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    adgen_info!("tracking of job {} cancelled", job.id());
                    break Err(ClientError::Cancelled);
                }
                Some(joined) = in_flight.join_next() => {
                    let (seq, answer) = match joined {
                        Ok(answer) => answer,
                        Err(err) => {
                            adgen_warn!("poll task for job {} died: {err}", job.id());
                            continue;
                        }
                    };
                    match answer {
                        Ok(snapshot) => {
                            if job.apply_poll(seq, snapshot) == PollApply::Applied {
                                on_update(&job);
                                if job.is_terminal() {
                                    adgen_info!("job {} finished as {:?}", job.id(), job.status());
                                    break Ok(job);
                                }
                            }
                        }
                        Err(err @ (ClientError::TransientNetwork { .. } | ClientError::Protocol { .. })) => {
                            let failures = job.record_transient_failure();
                            if failures >= self.transient_retry_budget {
                                adgen_warn!("job {}: giving up after {failures} failed polls", job.id());
                                break Err(match err {
                                    ClientError::Protocol { message } => ClientError::transient(message),
                                    other => other,
                                });
                            }
                            adgen_debug!("job {}: poll #{seq} failed ({err}), retrying", job.id());
                        }
                        Err(err) => break Err(err),
                    }
                }
                _ = ticker.tick() => {
                    let seq = job.issue_poll();
                    let backend = self.backend.clone();
                    let id = job.id().clone();
                    in_flight.spawn(async move { (seq, backend.poll(&id).await) });
                }
            }
        };

        in_flight.abort_all();
        outcome
    }

    /// `start` followed by `track`.
    pub async fn run<F>(
        &self,
        kind: JobKind,
        parameters: &Value,
        cancel: &CancellationToken,
        on_update: F,
    ) -> Result<TrackedJob, ClientError>
    where
        F: FnMut(&TrackedJob) + Send,
    {
        let job_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            started = self.start(kind, parameters) => started?,
        };
        self.track(job_id, kind, cancel, on_update).await
    }
}
