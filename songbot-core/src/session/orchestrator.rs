//! Per-request session pipeline.
//!
//! ```text
//! validate URL ─► allocate workspace ─► fetch ─► collect ─► deliver
//!                        │                                     │
//!                        └──────────── release ◄───────────────┘
//! ```
//!
//! Every exit path releases the workspace. A failed session sends exactly one
//! diagnostic text; errors never escape `run`.

use super::types::*;
use crate::acquisition::{
    is_valid_source_url, AcquisitionFailure, AcquisitionOptions, AcquisitionResult, Acquirer,
};
use crate::artifact::ArtifactCollector;
use crate::config::BotConfig;
use crate::delivery::{DeliveryAdapter, DeliveryReport, Messenger};
use crate::workspace::WorkspaceAllocator;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs sessions. Holds no per-session state, so one instance serves any
/// number of concurrent sessions.
#[derive(Clone)]
pub struct SessionOrchestrator {
    allocator: WorkspaceAllocator,
    acquirer: Arc<dyn Acquirer>,
    options: AcquisitionOptions,
    collector: ArtifactCollector,
    messenger: Arc<dyn Messenger>,
    delivery: DeliveryAdapter,
}

impl SessionOrchestrator {
    pub fn new(
        config: &BotConfig,
        acquirer: Arc<dyn Acquirer>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            allocator: WorkspaceAllocator::new(&config.workspace.root),
            acquirer,
            options: config.acquisition.options.clone(),
            collector: ArtifactCollector::for_format(config.acquisition.options.format),
            delivery: DeliveryAdapter::new(Arc::clone(&messenger), &config.delivery),
            messenger,
        }
    }

    pub fn allocator(&self) -> &WorkspaceAllocator {
        &self.allocator
    }

    /// Run one session to a terminal state.
    pub async fn run(&self, request: &SessionRequest) -> SessionOutcome {
        let mut session = Session::new(request);
        info!(
            session_id = %session.id,
            user = ?request.username,
            "Starting session for {}",
            session.source_url
        );

        if !is_valid_source_url(&session.source_url) {
            return self.finish(&mut session, Some(FailureReason::InvalidUrl), None, true).await;
        }

        let workspace = match self.allocator.allocate(&session.id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(session_id = %session.id, "Workspace allocation failed: {}", e);
                return self.finish(&mut session, Some(FailureReason::Allocation), None, true).await;
            }
        };
        session.workspace_path = Some(workspace.path().to_path_buf());

        self.notify(&session, messages::DOWNLOADING).await;
        session.advance(SessionState::Downloading);

        let result = self
            .acquirer
            .fetch(workspace.path(), &session.source_url, &self.options)
            .await;

        let (failure, report) = match result {
            AcquisitionResult::Failure(AcquisitionFailure::InvalidUrl) => {
                (Some(FailureReason::InvalidUrl), None)
            }
            AcquisitionResult::Failure(failure) => {
                warn!(session_id = %session.id, "Acquisition failed: {}", failure);
                (Some(FailureReason::Acquisition), None)
            }
            AcquisitionResult::Success => {
                session.advance(SessionState::Collecting);
                session.artifacts = self.collector.collect(workspace.path()).await;

                if session.artifacts.is_empty() {
                    warn!(session_id = %session.id, "No .{} files produced", self.collector.extension());
                    (Some(FailureReason::NoArtifacts), None)
                } else {
                    session.advance(SessionState::Delivering);
                    let report = self
                        .delivery
                        .deliver(session.conversation_id, &session.artifacts)
                        .await;
                    if report.nothing_delivered() {
                        (Some(FailureReason::NothingDelivered), Some(report))
                    } else {
                        (None, Some(report))
                    }
                }
            }
        };

        let released = match workspace.release().await {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = %session.id, "{}", e);
                false
            }
        };

        self.finish(&mut session, failure, report, released).await
    }

    async fn finish(
        &self,
        session: &mut Session,
        failure: Option<FailureReason>,
        report: Option<DeliveryReport>,
        workspace_released: bool,
    ) -> SessionOutcome {
        match failure {
            Some(reason) => {
                session.advance(SessionState::Failed);
                info!(session_id = %session.id, "Session failed: {}", reason);
                self.notify(session, reason.user_message()).await;
            }
            None => {
                session.advance(SessionState::Completed);
                info!(session_id = %session.id, "Session completed");
            }
        }

        SessionOutcome {
            session_id: session.id.clone(),
            state: session.state,
            failure,
            report,
            workspace_released,
        }
    }

    async fn notify(&self, session: &Session, text: &str) {
        if let Err(e) = self.messenger.send_text(session.conversation_id, text).await {
            warn!(session_id = %session.id, "Failed to send status text: {}", e);
        }
    }
}
