//! Single-slot completion signaling between the sequencer and the renderer.
//!
//! The sequencer arms the slot for the unit it is about to display, then
//! waits. The wait ends exactly once: when the renderer reports the unit
//! complete, when the dwell timer fires, or when the slot is cancelled.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

/// How a display wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The renderer signaled completion
    Finished,
    /// The sequencer's dwell timer ran out
    Elapsed,
    /// The wait was force-resolved by a stop
    Cancelled,
}

struct PendingWait {
    seq: u64,
    tx: oneshot::Sender<Completion>,
}

/// Holds the one outstanding display wait, if any.
#[derive(Default)]
pub struct CompletionSlot {
    pending: Mutex<Option<PendingWait>>,
}

impl CompletionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot for unit `seq`.
    ///
    /// A wait left over from an earlier unit is force-resolved first so there
    /// is never more than one outstanding.
    pub fn arm(&self, seq: u64) -> CompletionWait {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(PendingWait { seq, tx });

        if let Some(previous) = previous {
            warn!(
                "[Sequencer] Wait for unit {} still pending when arming {}",
                previous.seq, seq
            );
            let _ = previous.tx.send(Completion::Cancelled);
        }

        CompletionWait { seq, rx }
    }

    /// Resolve the wait for unit `seq`. Signals naming any other unit are
    /// ignored. Returns whether a wait was resolved.
    pub fn complete(&self, seq: u64) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.take() {
            Some(wait) if wait.seq == seq => wait.tx.send(Completion::Finished).is_ok(),
            other => {
                *pending = other;
                false
            }
        }
    }

    /// Force-resolve whatever wait is outstanding. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(wait) => {
                let _ = wait.tx.send(Completion::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Unit the slot is currently armed for.
    pub fn pending_seq(&self) -> Option<u64> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|wait| wait.seq)
    }

    fn disarm(&self, seq: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|wait| wait.seq == seq) {
            *pending = None;
        }
    }
}

/// The receiving half of an armed slot.
pub struct CompletionWait {
    seq: u64,
    rx: oneshot::Receiver<Completion>,
}

impl CompletionWait {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait for the unit to complete.
    ///
    /// With `dwell` set, the wait also ends when the timer elapses; without
    /// it, only an external signal or cancellation ends it. The slot is
    /// disarmed before returning.
    pub async fn wait(self, slot: &CompletionSlot, dwell: Option<Duration>) -> Completion {
        let CompletionWait { seq, rx } = self;
        let outcome = match dwell {
            Some(dwell) => {
                tokio::select! {
                    biased;
                    signal = rx => signal.unwrap_or(Completion::Cancelled),
                    _ = tokio::time::sleep(dwell) => Completion::Elapsed,
                }
            }
            None => rx.await.unwrap_or(Completion::Cancelled),
        };
        slot.disarm(seq);
        outcome
    }
}
