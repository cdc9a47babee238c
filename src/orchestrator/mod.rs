pub mod crop;
pub mod tools;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::{compress_to_size, convert, crop_to_id_size, resize, ImagePayload, PipelineError};
use crate::providers::{ProviderError, ProviderKind, ProviderOperation, ProviderRegistry};

pub use crop::{CropRegion, CropStrategy, RegionCropStrategy, SharedCropStrategy};
pub use tools::{Tool, ToolCategory, ToolParams, TOOL_CATALOG};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use OperationStatus::{Failed, Idle, Running, Succeeded};

        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Succeeded, Idle)
                | (Failed, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("an operation is already running")]
    Busy,
    #[error("no source image loaded")]
    MissingSource,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation was superseded by a reset")]
    Superseded,
    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: OperationStatus,
        to: OperationStatus,
    },
    #[error("worker task failed: {0}")]
    Worker(String),
}

/// What the UI shows after a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub tool: Tool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    pub message: String,
    pub detail: String,
}

/// Marks a success that did not fully meet what was asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeNote {
    CompressionTargetMissed {
        target_bytes: usize,
        achieved_bytes: usize,
    },
    EmptyDescription,
}

#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub operation_id: Uuid,
    pub tool: Tool,
    pub provider: Option<ProviderKind>,
    pub payload: ImagePayload,
    pub notes: Vec<OutcomeNote>,
    pub finished_at: DateTime<Utc>,
}

impl OperationOutcome {
    pub fn is_qualified(&self) -> bool {
        !self.notes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: OperationStatus,
    pub current_image: Option<ImagePayload>,
    pub result: Option<ImagePayload>,
    pub error: Option<FailureReport>,
    pub active_tool: Option<Tool>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_provider: ProviderKind,
    pub operation_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::BigModel,
            operation_timeout: None,
        }
    }
}

struct ActiveOperation {
    id: Uuid,
    tool: Tool,
    cancel: Option<oneshot::Sender<()>>,
}

struct Session {
    status: OperationStatus,
    current_image: Option<ImagePayload>,
    result: Option<ImagePayload>,
    last_error: Option<FailureReport>,
    active: Option<ActiveOperation>,
}

impl Session {
    fn transition(&mut self, next: OperationStatus) -> Result<(), DispatchError> {
        if !self.status.can_transition_to(next) {
            return Err(DispatchError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

struct ToolSuccess {
    payload: ImagePayload,
    notes: Vec<OutcomeNote>,
}

/// Owns one editing session: the source image, the latest result and the lifecycle
/// of the single operation allowed in flight.
pub struct Orchestrator {
    providers: ProviderRegistry,
    crop_strategy: Option<SharedCropStrategy>,
    config: OrchestratorConfig,
    session: Mutex<Session>,
    status_tx: watch::Sender<OperationStatus>,
}

impl Orchestrator {
    pub fn new(providers: ProviderRegistry, config: OrchestratorConfig) -> Self {
        let (status_tx, _) = watch::channel(OperationStatus::Idle);
        Self {
            providers,
            crop_strategy: None,
            config,
            session: Mutex::new(Session {
                status: OperationStatus::Idle,
                current_image: None,
                result: None,
                last_error: None,
                active: None,
            }),
            status_tx,
        }
    }

    pub fn with_crop_strategy(mut self, strategy: SharedCropStrategy) -> Self {
        self.crop_strategy = Some(strategy);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> OperationStatus {
        self.session().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.session();
        SessionSnapshot {
            status: session.status,
            current_image: session.current_image.clone(),
            result: session.result.clone(),
            error: session.last_error.clone(),
            active_tool: session.active.as_ref().map(|active| active.tool),
        }
    }

    /// Replaces the source image and drops any previous result.
    pub fn load_image(&self, image: ImagePayload) -> Result<(), DispatchError> {
        let mut session = self.session();
        if session.status == OperationStatus::Running {
            return Err(DispatchError::Busy);
        }
        if session.status.is_terminal() {
            session.transition(OperationStatus::Idle)?;
        }
        session.current_image = Some(image);
        session.result = None;
        session.last_error = None;
        self.publish(session.status);
        Ok(())
    }

    /// Asks the in-flight operation to stop. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let mut session = self.session();
        let Some(cancel) = session
            .active
            .as_mut()
            .and_then(|active| active.cancel.take())
        else {
            return false;
        };
        let _ = cancel.send(());
        true
    }

    /// Back to Idle with an empty session. An in-flight operation is failed and its
    /// eventual completion is discarded.
    pub fn reset(&self) {
        let mut session = self.session();
        if let Some(active) = session.active.take() {
            info!(operation_id = %active.id, tool = %active.tool, "abandoning in-flight operation");
            if session.transition(OperationStatus::Failed).is_ok() {
                self.publish(OperationStatus::Failed);
            }
        }
        if session.status.is_terminal() && session.transition(OperationStatus::Idle).is_ok() {
            self.publish(OperationStatus::Idle);
        }
        session.current_image = None;
        session.result = None;
        session.last_error = None;
    }

    pub async fn dispatch(
        &self,
        tool: Tool,
        params: ToolParams,
    ) -> Result<OperationOutcome, DispatchError> {
        let provider = tool
            .uses_provider()
            .then(|| params.provider.unwrap_or(self.config.default_provider));
        let (operation_id, source, cancel_rx) = self.begin(tool)?;
        info!(
            operation_id = %operation_id,
            tool = %tool,
            provider = provider.map(ProviderKind::as_str),
            "operation started"
        );

        let mut pending = PendingOperation {
            orchestrator: self,
            operation_id,
            tool,
            provider,
            settled: false,
        };
        let work = self.run_tool(tool, provider, params, source);
        let result = tokio::select! {
            result = self.bounded(work) => result,
            _ = cancel_rx => Err(DispatchError::Cancelled),
        };
        pending.settled = true;
        self.finish(operation_id, tool, provider, result)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: OperationStatus) {
        self.status_tx.send_replace(status);
    }

    fn begin(
        &self,
        tool: Tool,
    ) -> Result<(Uuid, Option<ImagePayload>, oneshot::Receiver<()>), DispatchError> {
        let mut session = self.session();
        if session.status == OperationStatus::Running {
            return Err(DispatchError::Busy);
        }
        let source = session.current_image.clone();
        if tool.needs_source() && source.is_none() {
            return Err(DispatchError::MissingSource);
        }
        if session.status.is_terminal() {
            session.transition(OperationStatus::Idle)?;
            self.publish(OperationStatus::Idle);
        }
        session.transition(OperationStatus::Running)?;
        session.last_error = None;

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        session.active = Some(ActiveOperation {
            id,
            tool,
            cancel: Some(cancel_tx),
        });
        self.publish(OperationStatus::Running);
        Ok((id, source, cancel_rx))
    }

    async fn bounded<F>(&self, work: F) -> Result<ToolSuccess, DispatchError>
    where
        F: std::future::Future<Output = Result<ToolSuccess, DispatchError>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or(Err(DispatchError::TimedOut(limit))),
            None => work.await,
        }
    }

    fn finish(
        &self,
        operation_id: Uuid,
        tool: Tool,
        provider: Option<ProviderKind>,
        result: Result<ToolSuccess, DispatchError>,
    ) -> Result<OperationOutcome, DispatchError> {
        let mut session = self.session();
        let is_current = session
            .active
            .as_ref()
            .is_some_and(|active| active.id == operation_id);
        if !is_current {
            debug!(operation_id = %operation_id, "discarding stale completion");
            return Err(DispatchError::Superseded);
        }
        session.active = None;

        match result {
            Ok(success) => {
                session.transition(OperationStatus::Succeeded)?;
                session.result = Some(success.payload.clone());
                session.last_error = None;
                self.publish(OperationStatus::Succeeded);
                info!(
                    operation_id = %operation_id,
                    tool = %tool,
                    bytes = success.payload.len(),
                    mime = %success.payload.mime(),
                    notes = success.notes.len(),
                    "operation succeeded"
                );
                Ok(OperationOutcome {
                    operation_id,
                    tool,
                    provider,
                    payload: success.payload,
                    notes: success.notes,
                    finished_at: Utc::now(),
                })
            }
            Err(err) => {
                session.transition(OperationStatus::Failed)?;
                let report = failure_report(tool, provider, &err);
                warn!(
                    operation_id = %operation_id,
                    tool = %tool,
                    error = %report.detail,
                    "operation failed"
                );
                session.last_error = Some(report);
                self.publish(OperationStatus::Failed);
                Err(err)
            }
        }
    }

    /// Fails an operation whose dispatch future was dropped before it settled.
    fn abandon(&self, operation_id: Uuid, tool: Tool, provider: Option<ProviderKind>) {
        let mut session = self.session();
        let is_current = session
            .active
            .as_ref()
            .is_some_and(|active| active.id == operation_id);
        if !is_current {
            return;
        }
        session.active = None;
        if session.transition(OperationStatus::Failed).is_ok() {
            warn!(operation_id = %operation_id, tool = %tool, "dispatch dropped before completion");
            session.last_error = Some(failure_report(tool, provider, &DispatchError::Cancelled));
            self.publish(OperationStatus::Failed);
        }
    }

    async fn run_tool(
        &self,
        tool: Tool,
        provider: Option<ProviderKind>,
        params: ToolParams,
        source: Option<ImagePayload>,
    ) -> Result<ToolSuccess, DispatchError> {
        match tool {
            Tool::Compress => {
                let image = required_source(source)?;
                let target_kb = params.target_kb;
                run_blocking(move || {
                    let outcome = compress_to_size(&image, target_kb)?;
                    let mut notes = Vec::new();
                    if !outcome.target_met {
                        notes.push(OutcomeNote::CompressionTargetMissed {
                            target_bytes: outcome.target_bytes,
                            achieved_bytes: outcome.payload.len(),
                        });
                    }
                    Ok(ToolSuccess {
                        payload: outcome.payload,
                        notes,
                    })
                })
                .await
            }
            Tool::Resize => {
                let image = required_source(source)?;
                let strategy = self.crop_strategy.clone();
                run_blocking(move || {
                    let (width, height) = if params.lock_aspect {
                        let (src_w, src_h) = image.dimensions()?;
                        params.resize_dimensions(src_w, src_h)
                    } else {
                        (params.resize_width, params.resize_height)
                    };
                    let exported = match strategy {
                        Some(strategy) => strategy.export(&image, width, height)?,
                        None => None,
                    };
                    let payload = match exported {
                        Some(payload) => payload,
                        None => resize(&image, width, height)?,
                    };
                    Ok(ToolSuccess {
                        payload,
                        notes: Vec::new(),
                    })
                })
                .await
            }
            Tool::Convert => {
                let image = required_source(source)?;
                run_blocking(move || {
                    Ok(ToolSuccess {
                        payload: convert(&image, params.target_mime, params.quality)?,
                        notes: Vec::new(),
                    })
                })
                .await
            }
            Tool::Upscale
            | Tool::Restore
            | Tool::RemoveBg
            | Tool::RemoveObject
            | Tool::IdPhoto
            | Tool::TextToImage
            | Tool::Meme => {
                let kind = provider.unwrap_or(self.config.default_provider);
                let adapter = self.providers.get(kind);
                let operation = provider_operation(tool, &params);
                let id_size = params.id_size;
                run_blocking(move || {
                    let output = adapter.run(&operation, source.as_ref())?;
                    let mut notes = Vec::new();
                    if output.description_was_empty() {
                        notes.push(OutcomeNote::EmptyDescription);
                    }
                    let payload = if tool == Tool::IdPhoto {
                        crop_to_id_size(&output.payload, id_size.px_width, id_size.px_height)?
                    } else {
                        output.payload
                    };
                    Ok(ToolSuccess { payload, notes })
                })
                .await
            }
        }
    }
}

fn required_source(source: Option<ImagePayload>) -> Result<ImagePayload, DispatchError> {
    source.ok_or(DispatchError::MissingSource)
}

fn provider_operation(tool: Tool, params: &ToolParams) -> ProviderOperation {
    match tool {
        Tool::RemoveBg => ProviderOperation::RemoveBackground,
        Tool::IdPhoto => ProviderOperation::IdPhoto {
            color: params.id_color.clone(),
        },
        Tool::Upscale => ProviderOperation::Upscale,
        Tool::Restore => ProviderOperation::RestorePhoto,
        Tool::RemoveObject => {
            if params.object_description.trim().is_empty() {
                warn!("remove-object dispatched without an object description");
            }
            ProviderOperation::RemoveObject {
                description: params.object_description.clone(),
            }
        }
        Tool::Meme => ProviderOperation::Meme {
            top_text: params.meme_top_text.clone(),
            bottom_text: params.meme_bottom_text.clone(),
        },
        Tool::TextToImage | Tool::Compress | Tool::Resize | Tool::Convert => {
            ProviderOperation::TextToImage {
                prompt: params.prompt.clone(),
                size: params.generation_size.clone(),
            }
        }
    }
}

struct PendingOperation<'a> {
    orchestrator: &'a Orchestrator,
    operation_id: Uuid,
    tool: Tool,
    provider: Option<ProviderKind>,
    settled: bool,
}

impl Drop for PendingOperation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.orchestrator
                .abandon(self.operation_id, self.tool, self.provider);
        }
    }
}

fn failure_report(tool: Tool, provider: Option<ProviderKind>, err: &DispatchError) -> FailureReport {
    let detail = err.to_string();
    let message = match provider {
        Some(kind) => kind.failure_message(),
        None => format!("Processing Failed: {detail}"),
    };
    FailureReport {
        tool,
        provider,
        message,
        detail,
    }
}

async fn run_blocking<F>(job: F) -> Result<ToolSuccess, DispatchError>
where
    F: FnOnce() -> Result<ToolSuccess, DispatchError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| DispatchError::Worker(e.to_string()))?
}
