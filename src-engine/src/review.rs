//! Review-mode state machine.
//!
//! All review-state changes go through [`ReviewState::on`]. The sequencer only
//! reports [`ReviewEvent::QueueDrained`] once the queue is empty, which is what
//! keeps `Reviewing` from ever coexisting with queued units.

pub use signflow_common::ReviewState;

/// Inputs that can move the review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    /// A drain loop started consuming the queue
    DrainStarted,
    /// A finalized speech segment arrived; new speech preempts review
    SpeechFinalized,
    /// The queue ran dry
    QueueDrained { missing_empty: bool },
    /// The user dismissed every pending missing word
    ReviewSkipped,
    /// A missing word gained a library entry
    WordResolved { missing_empty: bool },
    /// The listening session ended
    SessionStopped,
}

pub trait ReviewTransition {
    fn on(self, event: ReviewEvent) -> ReviewState;
}

impl ReviewTransition for ReviewState {
    fn on(self, event: ReviewEvent) -> ReviewState {
        match (self, event) {
            (_, ReviewEvent::DrainStarted) | (_, ReviewEvent::SpeechFinalized) => {
                ReviewState::Sequencing
            }
            (_, ReviewEvent::QueueDrained { missing_empty: true }) => ReviewState::Idle,
            (_, ReviewEvent::QueueDrained { missing_empty: false }) => ReviewState::Reviewing,
            // Skipping never interrupts playback already under way.
            (ReviewState::Sequencing, ReviewEvent::ReviewSkipped) => ReviewState::Sequencing,
            (_, ReviewEvent::ReviewSkipped) | (_, ReviewEvent::SessionStopped) => ReviewState::Idle,
            (ReviewState::Reviewing, ReviewEvent::WordResolved { missing_empty: true }) => {
                ReviewState::Idle
            }
            (state, ReviewEvent::WordResolved { .. }) => state,
        }
    }
}
