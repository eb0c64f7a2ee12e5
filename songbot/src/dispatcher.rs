//! Long-poll dispatch loop.
//!
//! Polls Telegram for updates, routes each text message and runs one session
//! task per download request. A semaphore bounds how many sessions are live
//! at once; further requests wait for a permit.

use crate::telegram::{TelegramClient, Update};
use anyhow::Result;
use songbot_core::delivery::Messenger;
use songbot_core::router::{InboundMessage, RequestRouter, Route};
use songbot_core::session::{ConversationId, SessionOutcome, SessionRequest};
use songbot_core::{BotConfig, SessionOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

pub struct Dispatcher {
    client: Arc<TelegramClient>,
    router: RequestRouter,
    orchestrator: SessionOrchestrator,
    sessions: Arc<Semaphore>,
    poll_interval: Duration,
    retry_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        client: Arc<TelegramClient>,
        config: &BotConfig,
        orchestrator: SessionOrchestrator,
    ) -> Self {
        Self {
            client,
            router: RequestRouter::new(config.auth.clone()),
            orchestrator,
            sessions: Arc::new(Semaphore::new(config.dispatch.max_concurrent_sessions)),
            poll_interval: Duration::from_millis(config.telegram.poll_interval_ms),
            retry_backoff: Duration::from_secs(config.telegram.retry_backoff_secs),
        }
    }

    /// Serve until Ctrl-C, then wait for in-flight sessions to finish.
    pub async fn run(self) -> Result<()> {
        let mut offset: Option<i64> = None;
        let mut tasks: JoinSet<SessionOutcome> = JoinSet::new();
        let mut replies: JoinSet<()> = JoinSet::new();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            "Polling for updates (max {} concurrent sessions)",
            self.sessions.available_permits()
        );

        loop {
            let pause = tokio::select! {
                _ = &mut shutdown => break,
                polled = self.client.get_updates(offset) => match polled {
                    Ok(updates) => {
                        offset = next_offset(offset, &updates);
                        for message in updates.into_iter().filter_map(Update::into_inbound) {
                            self.dispatch(message, &mut tasks, &mut replies);
                        }
                        self.poll_interval
                    }
                    Err(e) => {
                        warn!("getUpdates failed, retrying in {:?}: {}", self.retry_backoff, e);
                        self.retry_backoff
                    }
                },
            };

            while let Some(joined) = tasks.try_join_next() {
                log_session_result(joined);
            }
            while let Some(joined) = replies.try_join_next() {
                log_reply_result(joined);
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Shutting down, waiting for {} in-flight session(s)", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            log_session_result(joined);
        }
        while let Some(joined) = replies.join_next().await {
            log_reply_result(joined);
        }
        info!("Shutdown complete");
        Ok(())
    }

    fn dispatch(
        &self,
        message: InboundMessage,
        tasks: &mut JoinSet<SessionOutcome>,
        replies: &mut JoinSet<()>,
    ) {
        let conversation_id = message.conversation_id;
        let route = self.router.route(&message);
        debug!(conversation_id = %conversation_id, "Routed message: {:?}", route);

        match route {
            Route::Download(request) => spawn_session(
                tasks,
                Arc::clone(&self.sessions),
                self.orchestrator.clone(),
                request,
            ),
            Route::Ignore => {}
            route => {
                if let Some(text) = route.reply_text() {
                    spawn_reply(replies, self.client.clone(), conversation_id, text);
                }
            }
        }
    }
}

/// Acknowledge every update in `updates` on the next poll.
fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .max(current)
}

/// Run a session once a permit is free.
fn spawn_session(
    tasks: &mut JoinSet<SessionOutcome>,
    sessions: Arc<Semaphore>,
    orchestrator: SessionOrchestrator,
    request: SessionRequest,
) {
    tasks.spawn(async move {
        // The semaphore is never closed, so acquisition only fails on shutdown races.
        let _permit = sessions.acquire_owned().await.ok();
        orchestrator.run(&request).await
    });
}

/// Send a fixed reply without holding up the poll loop.
fn spawn_reply(
    replies: &mut JoinSet<()>,
    messenger: Arc<dyn Messenger>,
    conversation_id: ConversationId,
    text: &'static str,
) {
    replies.spawn(async move {
        if let Err(e) = messenger.send_text(conversation_id, text).await {
            warn!(conversation_id = %conversation_id, "Failed to reply: {}", e);
        }
    });
}

fn log_reply_result(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!("Reply task panicked: {}", e);
    }
}

fn log_session_result(joined: std::result::Result<SessionOutcome, JoinError>) {
    match joined {
        Ok(outcome) => {
            let (attempted, succeeded) = outcome
                .report
                .as_ref()
                .map(|r| (r.attempted, r.succeeded))
                .unwrap_or((0, 0));
            debug!(
                session_id = %outcome.session_id,
                state = %outcome.state,
                attempted,
                succeeded,
                released = outcome.workspace_released,
                "Session task finished"
            );
            if !outcome.workspace_released {
                warn!(session_id = %outcome.session_id, "Workspace was not released");
            }
        }
        Err(e) => error!("Session task panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use songbot_core::acquisition::{AcquisitionOptions, AcquisitionResult, Acquirer};
    use songbot_core::session::{MessageId, SessionState, messages};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn update(update_id: i64) -> Update {
        serde_json::from_value(serde_json::json!({ "update_id": update_id })).unwrap()
    }

    #[test]
    fn test_next_offset() {
        assert_eq!(next_offset(None, &[]), None);
        assert_eq!(next_offset(Some(10), &[]), Some(10));
        assert_eq!(next_offset(None, &[update(5), update(7), update(6)]), Some(8));
        assert_eq!(next_offset(Some(20), &[update(5)]), Some(20));
    }

    struct Silent;

    #[async_trait]
    impl Messenger for Silent {
        async fn send_text(&self, _: ConversationId, _: &str) -> songbot_core::Result<()> {
            Ok(())
        }

        async fn send_audio(&self, _: ConversationId, _: &Path) -> songbot_core::Result<()> {
            Ok(())
        }
    }

    /// Holds every text until the gate opens.
    #[derive(Default)]
    struct GatedChat {
        gate: tokio::sync::Notify,
        texts: std::sync::Mutex<Vec<(ConversationId, String)>>,
    }

    #[async_trait]
    impl Messenger for GatedChat {
        async fn send_text(
            &self,
            conversation_id: ConversationId,
            text: &str,
        ) -> songbot_core::Result<()> {
            self.gate.notified().await;
            self.texts
                .lock()
                .unwrap()
                .push((conversation_id, text.to_string()));
            Ok(())
        }

        async fn send_audio(&self, _: ConversationId, _: &Path) -> songbot_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reply_does_not_wait_for_send() {
        let chat = Arc::new(GatedChat::default());
        let mut replies = JoinSet::new();

        spawn_reply(&mut replies, chat.clone(), ConversationId(9), messages::INVALID_URL);
        tokio::task::yield_now().await;
        assert!(chat.texts.lock().unwrap().is_empty());

        chat.gate.notify_one();
        while let Some(joined) = replies.join_next().await {
            joined.unwrap();
        }

        assert_eq!(
            *chat.texts.lock().unwrap(),
            vec![(ConversationId(9), messages::INVALID_URL.to_string())]
        );
    }

    /// Tracks the highest number of overlapping fetches.
    #[derive(Default)]
    struct Overlap {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Acquirer for Overlap {
        async fn fetch(&self, workspace: &Path, _: &str, _: &AcquisitionOptions) -> AcquisitionResult {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(workspace.join("song.mp3"), b"ID3").unwrap();
            self.live.fetch_sub(1, Ordering::SeqCst);
            AcquisitionResult::Success
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sessions_bounded_by_semaphore() {
        let temp = tempdir().unwrap();
        let mut config = BotConfig::default();
        config.workspace.root = temp.path().to_path_buf();

        let tool = Arc::new(Overlap::default());
        let orchestrator = SessionOrchestrator::new(&config, tool.clone(), Arc::new(Silent));
        let sessions = Arc::new(Semaphore::new(2));
        let mut tasks = JoinSet::new();

        for message in 0..6 {
            spawn_session(
                &mut tasks,
                Arc::clone(&sessions),
                orchestrator.clone(),
                SessionRequest {
                    conversation_id: ConversationId(1),
                    message_id: MessageId(message),
                    source_url: "https://x.test/t".to_string(),
                    username: None,
                },
            );
        }

        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().state, SessionState::Completed);
            completed += 1;
        }

        assert_eq!(completed, 6);
        assert!(tool.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
