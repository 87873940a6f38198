use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use adgen_core::{ClientError, Effect, ProgressEvent, ProgressStream, Ticket};
use adgen_logging::{adgen_debug, adgen_info, adgen_warn};
use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backend::{DisposalAcker, EntitlementSource, EventSource, JobBackend};
use crate::export::export_saved;
use crate::stream::{ProgressStreamConsumer, StreamSink, StreamSubscription};
use crate::{ClientSettings, CredentialProvider, EngineEvent, HttpApi, JobTracker};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("async runtime could not start: {0}")]
    Runtime(#[from] io::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// The service collaborators the engine drives.
#[derive(Clone)]
pub struct EngineServices {
    pub jobs: Arc<dyn JobBackend>,
    pub events: Arc<dyn EventSource>,
    pub acker: Arc<dyn DisposalAcker>,
    pub entitlement: Arc<dyn EntitlementSource>,
}

impl EngineServices {
    pub fn from_http(api: HttpApi) -> Self {
        let api = Arc::new(api);
        Self {
            jobs: api.clone(),
            events: api.clone(),
            acker: api.clone(),
            entitlement: api,
        }
    }
}

enum EngineCommand {
    Execute(Effect),
    Shutdown,
}

/// Runs effects on a tokio runtime owned by a background thread and hands
/// results back through a channel the caller drains.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    worker: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn new(
        settings: ClientSettings,
        credentials: Arc<dyn CredentialProvider>,
        export_dir: PathBuf,
    ) -> Result<Self, EngineError> {
        let api = HttpApi::new(settings.clone(), credentials)?;
        Self::with_services(EngineServices::from_http(api), &settings, export_dir)
    }

    pub fn with_services(
        services: EngineServices,
        settings: &ClientSettings,
        export_dir: PathBuf,
    ) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("adgen-engine")
            .build()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let mut worker = Worker::new(services, settings, export_dir, event_tx);

        let handle = thread::Builder::new()
            .name("adgen-engine".to_string())
            .spawn(move || {
                {
                    let _entered = runtime.enter();
                    while let Ok(command) = cmd_rx.recv() {
                        match command {
                            EngineCommand::Execute(effect) => worker.execute(effect),
                            EngineCommand::Shutdown => break,
                        }
                    }
                    worker.cancel_all();
                }
                runtime.shutdown_timeout(Duration::from_secs(1));
            })?;

        Ok(Self {
            cmd_tx,
            event_rx,
            worker: Some(handle),
        })
    }

    pub fn execute(&self, effect: Effect) {
        if self.cmd_tx.send(EngineCommand::Execute(effect)).is_err() {
            adgen_warn!("engine worker is gone, effect dropped");
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Cancels every poll and stream and waits for the worker thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                adgen_warn!("engine worker panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    services: EngineServices,
    tracker: JobTracker,
    consumer: ProgressStreamConsumer,
    export_dir: PathBuf,
    event_tx: mpsc::Sender<EngineEvent>,
    tracking: TicketTokens,
    streams: HashMap<Ticket, StreamSubscription>,
}

impl Worker {
    fn new(
        services: EngineServices,
        settings: &ClientSettings,
        export_dir: PathBuf,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            tracker: JobTracker::new(services.jobs.clone(), settings),
            consumer: ProgressStreamConsumer::new(
                services.events.clone(),
                settings.stream_idle_timeout,
            ),
            services,
            export_dir,
            event_tx,
            tracking: TicketTokens::default(),
            streams: HashMap::new(),
        }
    }

    /// Must run inside the runtime context.
    fn execute(&mut self, effect: Effect) {
        self.streams.retain(|_, subscription| !subscription.is_finished());
        self.tracking.prune();
        match effect {
            Effect::FetchEntitlement => {
                let source = self.services.entitlement.clone();
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = source.entitlement().await;
                    let _ = tx.send(EngineEvent::EntitlementLoaded(result));
                });
            }
            Effect::StartJob {
                ticket,
                kind,
                parameters,
            } => {
                let lease = self.tracking.lease(ticket);
                let tracker = self.tracker.clone();
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    // The whole lease, not just its token, lives until the task ends.
                    let lease = lease;
                    tokio::select! {
                        biased;
                        _ = lease.token.cancelled() => {}
                        result = tracker.start(kind, &parameters) => {
                            let _ = tx.send(EngineEvent::JobStarted { ticket, result });
                        }
                    }
                });
            }
            Effect::PollJob {
                ticket,
                job_id,
                seq,
            } => {
                let lease = self.tracking.lease(ticket);
                let tracker = self.tracker.clone();
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    // The whole lease, not just its token, lives until the task ends.
                    let lease = lease;
                    tokio::select! {
                        biased;
                        _ = lease.token.cancelled() => {}
                        result = tracker.poll(&job_id) => {
                            let _ = tx.send(EngineEvent::PollCompleted {
                                ticket,
                                seq,
                                result,
                                received_at: Utc::now(),
                            });
                        }
                    }
                });
            }
            Effect::SubscribeStream {
                ticket,
                kind,
                parameters,
            } => {
                let sink = Arc::new(ChannelStreamSink {
                    ticket,
                    tx: self.event_tx.clone(),
                });
                let subscription = self.consumer.subscribe(kind, parameters, sink);
                if let Some(previous) = self.streams.insert(ticket, subscription) {
                    previous.cancel();
                }
            }
            Effect::CancelTracking { ticket } => {
                self.tracking.cancel(ticket);
                if let Some(subscription) = self.streams.remove(&ticket) {
                    subscription.cancel();
                }
                adgen_debug!("ticket {ticket}: tracking cancelled");
            }
            Effect::AckDisposal {
                ticket,
                candidate_id,
                direction,
                token,
            } => {
                let acker = self.services.acker.clone();
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = acker.acknowledge(&candidate_id, direction).await;
                    let _ = tx.send(EngineEvent::AckCompleted {
                        ticket,
                        candidate_id,
                        token,
                        result,
                    });
                });
            }
            Effect::ExportSaved {
                ticket,
                kind,
                job_id,
                candidates,
            } => {
                let dir = self.export_dir.clone();
                let tx = self.event_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let result = export_saved(&dir, kind, &job_id, &candidates, Utc::now())
                        .map(|summary| summary.path)
                        .map_err(|err| err.to_string());
                    let _ = tx.send(EngineEvent::ExportFinished { ticket, result });
                });
            }
            Effect::PromptUpgrade { .. } | Effect::RequestCredentials => {
                adgen_debug!("{effect:?} is a front-end concern, skipped");
            }
        }
    }

    fn cancel_all(&mut self) {
        self.tracking.cancel_all();
        for (_, subscription) in self.streams.drain() {
            subscription.cancel();
        }
        adgen_info!("engine stopped");
    }
}

struct ChannelStreamSink {
    ticket: Ticket,
    tx: mpsc::Sender<EngineEvent>,
}

impl StreamSink for ChannelStreamSink {
    fn event(&self, event: &ProgressEvent, _stream: &ProgressStream) {
        let _ = self.tx.send(EngineEvent::StreamEvent {
            ticket: self.ticket,
            event: event.clone(),
            received_at: Utc::now(),
        });
    }

    fn failed(&self, error: &ClientError) {
        let _ = self.tx.send(EngineEvent::StreamFailed {
            ticket: self.ticket,
            error: error.clone(),
        });
    }
}

/// Cancellation tokens for tickets that still have a start or poll in flight.
///
/// An entry lives as long as some [`TicketLease`] for it does; `prune` drops
/// the rest, so finished jobs leave nothing behind.
#[derive(Default)]
struct TicketTokens {
    entries: HashMap<Ticket, TicketEntry>,
}

struct TicketEntry {
    token: CancellationToken,
    in_flight: Arc<()>,
}

struct TicketLease {
    token: CancellationToken,
    _in_flight: Arc<()>,
}

impl TicketTokens {
    fn lease(&mut self, ticket: Ticket) -> TicketLease {
        let entry = self.entries.entry(ticket).or_insert_with(|| TicketEntry {
            token: CancellationToken::new(),
            in_flight: Arc::new(()),
        });
        TicketLease {
            token: entry.token.clone(),
            _in_flight: entry.in_flight.clone(),
        }
    }

    fn prune(&mut self) {
        self.entries
            .retain(|_, entry| Arc::strong_count(&entry.in_flight) > 1);
    }

    fn cancel(&mut self, ticket: Ticket) {
        if let Some(entry) = self.entries.remove(&ticket) {
            entry.token.cancel();
        }
    }

    fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.token.cancel();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
