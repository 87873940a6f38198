//! Stage reducer for the progress event stream of a multi-step generation job.
//!
//! Events arrive strictly ordered from the transport and are folded into a
//! coarse [`StreamStage`]. Stage progression is monotonic; `Complete` and
//! `Failed` are terminal, and nothing mutates the reducer once it has been
//! cancelled.

use adgen_logging::{adgen_debug, adgen_info, adgen_warn};
use serde_json::Value;

/// A named event from the progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Start,
    ScriptsStart,
    ScriptsComplete { scripts: Option<usize> },
    ImagesStart { total: Option<usize> },
    ImageStart { name: String },
    ImageComplete { progress: Option<u8> },
    CampaignComplete { campaign: Value },
    Complete { result: Option<Value> },
    Error { message: String },
    Unknown { name: String },
}

impl ProgressEvent {
    /// Builds an event from the wire name and its raw `data` payload.
    pub fn from_wire(name: &str, data: &str) -> Self {
        let payload: Value = if data.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()))
        };

        match name {
            "start" => ProgressEvent::Start,
            "scripts_start" => ProgressEvent::ScriptsStart,
            "scripts_complete" => ProgressEvent::ScriptsComplete {
                scripts: count_field(&payload, "scripts"),
            },
            "images_start" => ProgressEvent::ImagesStart {
                total: payload
                    .get("total")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize),
            },
            "image_start" => ProgressEvent::ImageStart {
                name: text_field(&payload, &["name", "image", "title"]).unwrap_or_default(),
            },
            "image_complete" => ProgressEvent::ImageComplete {
                progress: progress_field(&payload),
            },
            "campaign_complete" => ProgressEvent::CampaignComplete { campaign: payload },
            "complete" => ProgressEvent::Complete {
                result: match payload {
                    Value::Null => None,
                    Value::Object(ref obj) if obj.contains_key("result") => {
                        obj.get("result").filter(|v| !v.is_null()).cloned()
                    }
                    other => Some(other),
                },
            },
            "error" => ProgressEvent::Error {
                message: text_field(&payload, &["message", "error", "detail"])
                    .unwrap_or_else(|| "generation failed".to_string()),
            },
            other => ProgressEvent::Unknown {
                name: other.to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProgressEvent::Start => "start",
            ProgressEvent::ScriptsStart => "scripts_start",
            ProgressEvent::ScriptsComplete { .. } => "scripts_complete",
            ProgressEvent::ImagesStart { .. } => "images_start",
            ProgressEvent::ImageStart { .. } => "image_start",
            ProgressEvent::ImageComplete { .. } => "image_complete",
            ProgressEvent::CampaignComplete { .. } => "campaign_complete",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Unknown { name } => name,
        }
    }
}

fn text_field(payload: &Value, keys: &[&str]) -> Option<String> {
    if let Value::String(s) = payload {
        return Some(s.clone());
    }
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
}

fn count_field(payload: &Value, key: &str) -> Option<usize> {
    match payload.get(key)? {
        Value::Array(items) => Some(items.len()),
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        _ => None,
    }
}

fn progress_field(payload: &Value) -> Option<u8> {
    if let Some(n) = payload.as_f64().or_else(|| payload.get("progress")?.as_f64()) {
        return Some(n.clamp(0.0, 100.0).round() as u8);
    }
    let done = payload.get("completed")?.as_f64()?;
    let total = payload.get("total")?.as_f64()?;
    if total <= 0.0 {
        return None;
    }
    Some((done / total * 100.0).clamp(0.0, 100.0).round() as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StreamStage {
    #[default]
    Preparing,
    Scripts,
    Images,
    Complete,
    Failed,
}

impl StreamStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamStage::Complete | StreamStage::Failed)
    }

    fn target_for(event: &ProgressEvent) -> Option<StreamStage> {
        match event {
            ProgressEvent::Start => Some(StreamStage::Preparing),
            ProgressEvent::ScriptsStart | ProgressEvent::ScriptsComplete { .. } => {
                Some(StreamStage::Scripts)
            }
            ProgressEvent::ImagesStart { .. }
            | ProgressEvent::ImageStart { .. }
            | ProgressEvent::ImageComplete { .. } => Some(StreamStage::Images),
            ProgressEvent::CampaignComplete { .. } | ProgressEvent::Unknown { .. } => None,
            ProgressEvent::Complete { .. } => Some(StreamStage::Complete),
            ProgressEvent::Error { .. } => Some(StreamStage::Failed),
        }
    }
}

/// What a delivered event did to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStep {
    Advanced,
    Completed(Value),
    /// The stream failed; the caller must tear the subscription down.
    Failed(String),
    Ignored,
    /// Delivered after cancel or after a terminal event; nothing changed.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressStream {
    stage: StreamStage,
    scripts_ready: Option<usize>,
    images_total: Option<usize>,
    current_image: Option<String>,
    image_progress: Option<u8>,
    campaign: Option<Value>,
    result: Option<Value>,
    error: Option<String>,
    events_applied: usize,
    cancelled: bool,
}

impl ProgressStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> StreamStage {
        self.stage
    }

    pub fn scripts_ready(&self) -> Option<usize> {
        self.scripts_ready
    }

    pub fn images_total(&self) -> Option<usize> {
        self.images_total
    }

    pub fn current_image(&self) -> Option<&str> {
        self.current_image.as_deref()
    }

    pub fn image_progress(&self) -> Option<u8> {
        self.image_progress
    }

    pub fn campaign(&self) -> Option<&Value> {
        self.campaign.as_ref()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Accepts no events after either a terminal stage or `cancel()`.
    pub fn is_closed(&self) -> bool {
        self.cancelled || self.stage.is_terminal()
    }

    pub fn cancel(&mut self) {
        if !self.cancelled {
            adgen_info!("progress stream cancelled at {:?}", self.stage);
        }
        self.cancelled = true;
    }

    /// Fails the stream from outside the event flow (dropped connection, idle timeout).
    pub fn fail(&mut self, message: impl Into<String>) -> StreamStep {
        if self.is_closed() {
            return StreamStep::Closed;
        }
        let message = message.into();
        self.stage = StreamStage::Failed;
        self.error = Some(message.clone());
        self.cancelled = true;
        StreamStep::Failed(message)
    }

    pub fn apply(&mut self, event: ProgressEvent) -> StreamStep {
        if self.is_closed() {
            adgen_debug!("progress stream closed, dropping `{}`", event.name());
            return StreamStep::Closed;
        }

        let target = StreamStage::target_for(&event);
        let step = match event {
            ProgressEvent::Unknown { name } => {
                adgen_warn!("progress stream: ignoring unrecognized event `{name}`");
                return StreamStep::Ignored;
            }
            ProgressEvent::Error { message } => {
                return self.fail(message);
            }
            ProgressEvent::Complete { result: None } => {
                return self.fail("complete event carried no result");
            }
            ProgressEvent::Complete {
                result: Some(result),
            } => {
                self.result = Some(result.clone());
                StreamStep::Completed(result)
            }
            ProgressEvent::ScriptsComplete { scripts } => {
                if scripts.is_some() {
                    self.scripts_ready = scripts;
                }
                StreamStep::Advanced
            }
            ProgressEvent::ImagesStart { total } => {
                if total.is_some() {
                    self.images_total = total;
                }
                StreamStep::Advanced
            }
            ProgressEvent::ImageStart { name } => {
                if !name.is_empty() {
                    self.current_image = Some(name);
                }
                StreamStep::Advanced
            }
            ProgressEvent::ImageComplete { progress } => {
                if let Some(p) = progress {
                    self.image_progress = Some(self.image_progress.map_or(p, |prev| prev.max(p)));
                }
                StreamStep::Advanced
            }
            ProgressEvent::CampaignComplete { campaign } => {
                self.campaign = Some(campaign);
                StreamStep::Advanced
            }
            ProgressEvent::Start | ProgressEvent::ScriptsStart => StreamStep::Advanced,
        };

        // Never regress: a late event for an earlier stage keeps the current one.
        if let Some(target) = target {
            self.stage = self.stage.max(target);
        }
        self.events_applied += 1;
        step
    }
}
