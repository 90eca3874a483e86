use anyhow::{bail, Result};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{poll_loop, PollContext};

/// Lifetime handle for one session's poll loop.
pub struct PollingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PollingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, ctx: PollContext) -> Result<()> {
        if self.is_running() {
            bail!("polling already active for session {}", ctx.session_id);
        }

        let cancel_token = CancellationToken::new();
        let previous = self.handle.take();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            // a cancelled loop may still have a request in flight
            if let Some(previous) = previous {
                if let Err(err) = previous.await {
                    warn!("previous poll loop ended abnormally: {err}");
                }
            }
            if !token.is_cancelled() {
                poll_loop(ctx, token).await;
            }
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Signals the loop and returns without waiting for an in-flight frame
    /// request. Whatever it brings back is discarded. The handle is kept so
    /// the next `start` can wait for the old loop to drain.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
            info!("poll loop cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        let signalled = self
            .cancel_token
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false);
        let alive = self
            .handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        signalled && alive
    }
}

impl Default for PollingController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
