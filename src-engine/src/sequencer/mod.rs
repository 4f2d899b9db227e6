//! Playback sequencing.
//!
//! The sequencer drains a FIFO queue of play units one at a time. Each unit
//! is published to the renderer and the drain suspends on the
//! [`CompletionSlot`] until that unit is reported complete. At most one drain
//! loop runs per session; `is_draining` is the guard and `epoch` lets a loop
//! that outlived a stop notice it and exit.

mod completion;

pub use completion::{Completion, CompletionSlot, CompletionWait};

use signflow_common::PlayUnit;
use std::collections::VecDeque;

/// Sequencer half of the session state. Lives under the session lock.
#[derive(Debug, Default)]
pub struct SequencerState {
    queue: VecDeque<PlayUnit>,
    next_seq: u64,
    current: Option<PlayUnit>,
    is_draining: bool,
    epoch: u64,
}

/// What a drain loop should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainStep {
    /// Display this unit and wait for it
    Show(PlayUnit),
    /// Queue exhausted; the loop has ended
    Drained,
    /// The loop belongs to a stopped epoch and must exit silently
    Stale,
}

impl SequencerState {
    /// Append keys to the queue, assigning sequence numbers.
    pub fn enqueue(&mut self, keys: impl IntoIterator<Item = String>) -> usize {
        let before = self.queue.len();
        for key in keys {
            self.next_seq += 1;
            self.queue.push_back(PlayUnit {
                seq: self.next_seq,
                key,
            });
        }
        self.queue.len() - before
    }

    /// Claim the right to drain. Returns the epoch the new loop runs under,
    /// or `None` when a loop is already running or there is nothing queued.
    pub fn begin_drain(&mut self) -> Option<u64> {
        if self.is_draining || self.queue.is_empty() {
            return None;
        }
        self.is_draining = true;
        Some(self.epoch)
    }

    /// Advance the drain loop running under `epoch`.
    pub fn next_step(&mut self, epoch: u64) -> DrainStep {
        if epoch != self.epoch || !self.is_draining {
            return DrainStep::Stale;
        }
        match self.queue.pop_front() {
            Some(unit) => {
                self.current = Some(unit.clone());
                DrainStep::Show(unit)
            }
            None => {
                self.current = None;
                self.is_draining = false;
                DrainStep::Drained
            }
        }
    }

    /// Discard everything and invalidate any running loop.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.current = None;
        self.is_draining = false;
        self.epoch += 1;
    }

    pub fn current(&self) -> Option<&PlayUnit> {
        self.current.as_ref()
    }

    pub fn is_draining(&self) -> bool {
        self.is_draining
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_draining && self.queue.is_empty()
    }
}
