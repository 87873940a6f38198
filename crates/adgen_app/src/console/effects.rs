use std::sync::Arc;

use adgen_core::{Effect, Msg, UpgradeReason};
use adgen_engine::{EngineEvent, EngineHandle, EnvCredentials};
use adgen_logging::{adgen_info, adgen_warn};
use anyhow::Context;

use super::config::AppConfig;

/// Hands effects to the engine and turns engine events back into messages.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = EngineHandle::new(
            config.client_settings(),
            Arc::new(EnvCredentials::default()),
            config.export_dir.clone(),
        )
        .context("starting the engine")?;
        Ok(Self { engine })
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PromptUpgrade { reason } => println!("{}", upgrade_prompt(reason)),
                Effect::RequestCredentials => println!(
                    "Sign in required: set {} and run `refresh`.",
                    adgen_engine::TOKEN_ENV_VAR
                ),
                other => self.engine.execute(other),
            }
        }
    }

    /// Everything the engine reported since the last call, as messages.
    pub fn drain(&self) -> Vec<Msg> {
        let mut inbox = Vec::new();
        while let Some(event) = self.engine.try_recv() {
            if let Some(msg) = msg_for_event(event) {
                inbox.push(msg);
            }
        }
        inbox
    }

    pub fn shutdown(self) {
        self.engine.shutdown();
    }
}

fn upgrade_prompt(reason: UpgradeReason) -> &'static str {
    match reason {
        UpgradeReason::QuotaExceeded => "Out of credits. Upgrade your plan to keep generating.",
        UpgradeReason::LockedCandidate => "This result is locked. Upgrade to see every result.",
    }
}

/// Export has no reducer message; its outcome is reported here.
pub(crate) fn msg_for_event(event: EngineEvent) -> Option<Msg> {
    let msg = match event {
        EngineEvent::EntitlementLoaded(Ok(info)) => Msg::EntitlementLoaded {
            entitlement: info.entitlement,
            credits: info.credits,
        },
        EngineEvent::EntitlementLoaded(Err(err)) => {
            adgen_warn!("entitlement lookup failed: {}", err);
            return None;
        }
        EngineEvent::JobStarted { ticket, result } => match result {
            Ok(job_id) => Msg::JobStarted { ticket, job_id },
            Err(error) => Msg::StartFailed { ticket, error },
        },
        EngineEvent::PollCompleted {
            ticket,
            seq,
            result,
            received_at,
        } => match result {
            Ok(snapshot) => Msg::PollResponded {
                ticket,
                seq,
                snapshot,
                received_at,
            },
            Err(error) => Msg::PollFailed { ticket, seq, error },
        },
        EngineEvent::StreamEvent {
            ticket,
            event,
            received_at,
        } => Msg::StreamEventReceived {
            ticket,
            event,
            received_at,
        },
        EngineEvent::StreamFailed { ticket, error } => Msg::StreamFailed { ticket, error },
        EngineEvent::AckCompleted {
            ticket,
            candidate_id,
            token,
            result,
        } => match result {
            Ok(()) => Msg::AckSucceeded {
                ticket,
                candidate_id,
                token,
            },
            Err(error) => Msg::AckFailed {
                ticket,
                candidate_id,
                token,
                error,
            },
        },
        EngineEvent::ExportFinished { ticket, result } => {
            match result {
                Ok(path) => {
                    adgen_info!("export for job #{} written to {:?}", ticket, path);
                    println!("Exported job #{ticket} to {}", path.display());
                }
                Err(message) => {
                    adgen_warn!("export for job #{} failed: {}", ticket, message);
                    println!("Export for job #{ticket} failed: {message}");
                }
            }
            return None;
        }
    };
    Some(msg)
}
