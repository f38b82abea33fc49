use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

use super::EditorEvent;

/// Trailing-edge debounce for typed link input.
///
/// Each `schedule` aborts the previous sleeper and arms a new one. A
/// generation counter guards against a sleeper whose event was already
/// queued when it got superseded.
pub struct LinkDebouncer {
    delay: Duration,
    generation: u64,
    sleeper: Option<JoinHandle<()>>,
}

impl LinkDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            sleeper: None,
        }
    }

    /// Restart the quiet period; `value` is committed if it runs out.
    pub fn schedule(&mut self, value: String, tx: &UnboundedSender<EditorEvent>) {
        self.cancel();
        let generation = self.generation;
        let deadline = Instant::now() + self.delay;
        let tx = tx.clone();

        trace!(generation, "link debounce armed");
        self.sleeper = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tx.send(EditorEvent::LinkQuietPeriodElapsed { generation, value });
        }));
    }

    /// Drop the pending commit, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.sleeper.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Disarm if `generation` is the live one. False means the event is stale.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.sleeper.is_none() || generation != self.generation {
            return false;
        }
        self.sleeper = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.sleeper.is_some()
    }
}

impl Drop for LinkDebouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.sleeper.take() {
            handle.abort();
        }
    }
}
