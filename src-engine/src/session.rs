//! Listening session: the single authoritative owner of playback state.
//!
//! A [`Session`] ties the pipeline together:
//!
//! ```text
//! finalized segment
//!        │
//!        ▼
//! tokenize ──► match_tokens (reads library snapshot)
//!        │
//!        ├──► enqueue play units ──► drain loop ──► renderer ──► display_complete
//!        │
//!        └──► MissingSet ──► review state (Sequencing / Reviewing / Idle)
//! ```
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! Callbacks are invoked after the lock is released.

use serde::Serialize;
use signflow_common::{Asset, AssetPayload, DisplayItem, PlayUnit, SessionStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::library::{LibraryError, LibrarySnapshot, LibraryStore, SharedLibrary};
use crate::matcher::match_tokens;
use crate::missing::MissingSet;
use crate::review::{ReviewEvent, ReviewState, ReviewTransition};
use crate::sequencer::{CompletionSlot, CompletionWait, DrainStep, SequencerState};
use crate::text::{normalize_key, tokenize};

/// Timing and matching parameters for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// How long images and text fallbacks stay on screen
    pub dwell: Duration,
    /// Largest phrase window tried by the matcher
    pub max_phrase_words: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(signflow_common::config::DEFAULT_DISPLAY_DWELL_MS),
            max_phrase_words: signflow_common::config::DEFAULT_MAX_PHRASE_WORDS,
        }
    }
}

/// Callback trait for session events.
///
/// Implement this trait to drive a renderer and review surface. Every method
/// has an empty default so implementors only handle what they display.
pub trait SessionCallback: Send + Sync + 'static {
    /// The unit to display changed. `None` means display nothing.
    fn on_display(&self, _item: Option<&DisplayItem>) {}

    /// The review state changed.
    fn on_review_changed(&self, _state: ReviewState, _missing: &[String]) {}

    /// The set of missing words changed.
    fn on_missing_changed(&self, _missing: &[String]) {}

    /// The final or interim transcript changed.
    fn on_transcript(&self, _transcript: &str, _interim: &str) {}

    /// The user asked to author a sign for `word`.
    fn on_authoring_requested(&self, _word: &str) {}

    /// A library write did not reach persistent storage.
    fn on_storage_warning(&self, _message: &str) {}

    /// Speech capture failed in a way the user must see.
    fn on_capture_error(&self, _message: &str) {}
}

/// Callback that ignores every event.
pub struct NoopCallback;

impl SessionCallback for NoopCallback {}

/// Whether a library mutation was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// In-memory library and store both updated
    Persisted,
    /// In-memory library updated, store write failed
    MemoryOnly,
}

#[derive(Default)]
struct CoreState {
    sequencer: SequencerState,
    missing: MissingSet,
    review: ReviewState,
    transcript: String,
    interim: String,
    listening: bool,
}

impl CoreState {
    fn apply(&mut self, event: ReviewEvent) {
        self.review = self.review.on(event);
    }

    /// Start a drain if units are waiting, otherwise settle the review state.
    fn schedule_drain(&mut self) -> Option<u64> {
        if let Some(epoch) = self.sequencer.begin_drain() {
            self.apply(ReviewEvent::DrainStarted);
            return Some(epoch);
        }
        if self.sequencer.is_idle() {
            let missing_empty = self.missing.is_empty();
            self.apply(ReviewEvent::QueueDrained { missing_empty });
        }
        None
    }
}

/// Changes made under the lock that callbacks must hear about.
#[derive(Default)]
struct Changes {
    display: Option<Option<DisplayItem>>,
    missing: bool,
    transcript: bool,
}

struct Emission {
    display: Option<Option<DisplayItem>>,
    review: Option<(ReviewState, Vec<String>)>,
    missing: Option<Vec<String>>,
    transcript: Option<(String, String)>,
}

struct Inner {
    settings: PlaybackSettings,
    library: SharedLibrary,
    store: Arc<dyn LibraryStore>,
    state: Mutex<CoreState>,
    completion: CompletionSlot,
    callback: Arc<dyn SessionCallback>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state under the lock, then notify the callback of what changed.
    fn update<R>(&self, f: impl FnOnce(&mut CoreState, &mut Changes) -> R) -> R {
        let (result, emission) = {
            let mut state = self.lock();
            let review_before = state.review;
            let mut changes = Changes::default();
            let result = f(&mut state, &mut changes);

            let emission = Emission {
                display: changes.display,
                review: (state.review != review_before)
                    .then(|| (state.review, state.missing.as_slice().to_vec())),
                missing: changes
                    .missing
                    .then(|| state.missing.as_slice().to_vec()),
                transcript: changes
                    .transcript
                    .then(|| (state.transcript.clone(), state.interim.clone())),
            };
            (result, emission)
        };
        self.emit(emission);
        result
    }

    fn emit(&self, emission: Emission) {
        if let Some((transcript, interim)) = emission.transcript {
            self.callback.on_transcript(&transcript, &interim);
        }
        if let Some(missing) = emission.missing {
            self.callback.on_missing_changed(&missing);
        }
        if let Some(display) = emission.display {
            self.callback.on_display(display.as_ref());
        }
        if let Some((state, missing)) = emission.review {
            debug!("[Session] Review state -> {}", state);
            self.callback.on_review_changed(state, &missing);
        }
    }

    /// Drop missing words the current library can show.
    fn prune_missing(&self) {
        let snapshot = self.library.snapshot();
        self.update(|state, changes| {
            let removed = state.missing.retain_unknown(&snapshot);
            if removed > 0 {
                changes.missing = true;
                let missing_empty = state.missing.is_empty();
                state.apply(ReviewEvent::WordResolved { missing_empty });
            }
        });
    }
}

/// Drain loop. Runs until the queue is empty or its epoch is stopped.
async fn drain(inner: Arc<Inner>, epoch: u64) {
    debug!("[Sequencer] Drain started (epoch {})", epoch);
    loop {
        let next: Option<(DisplayItem, CompletionWait)> = inner.update(|state, changes| {
            match state.sequencer.next_step(epoch) {
                DrainStep::Show(unit) => {
                    let asset = inner.library.snapshot().get(&unit.key).cloned();
                    let item = DisplayItem { unit, asset };
                    // Armed under the lock so a concurrent stop always finds it.
                    let wait = inner.completion.arm(item.unit.seq);
                    changes.display = Some(Some(item.clone()));
                    Some((item, wait))
                }
                DrainStep::Drained => {
                    changes.display = Some(None);
                    let missing_empty = state.missing.is_empty();
                    state.apply(ReviewEvent::QueueDrained { missing_empty });
                    None
                }
                DrainStep::Stale => None,
            }
        });

        let Some((item, wait)) = next else {
            break;
        };

        let dwell = if item.completes_on_media_end() {
            None
        } else {
            Some(inner.settings.dwell)
        };
        let outcome = wait.wait(&inner.completion, dwell).await;
        debug!(
            "[Sequencer] Unit {} '{}' ended: {:?}",
            item.unit.seq, item.unit.key, outcome
        );
    }
    debug!("[Sequencer] Drain finished (epoch {})", epoch);
}

/// Handle to a listening session. Cheap to clone; all clones share state.
///
/// Methods that may start playback spawn onto the current Tokio runtime and
/// must be called from within one.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Start a session, fetching the library once from `store`.
    ///
    /// A store that fails to load leaves the session with an empty library
    /// and a storage warning; startup itself never fails.
    pub fn start(
        settings: PlaybackSettings,
        store: Arc<dyn LibraryStore>,
        callback: Arc<dyn SessionCallback>,
    ) -> Self {
        let snapshot = match store.get_all() {
            Ok(entries) => LibrarySnapshot::new(entries),
            Err(e) => {
                warn!("[Session] Failed to load sign library: {}", e);
                callback.on_storage_warning(&format!("Sign library could not be loaded: {}", e));
                LibrarySnapshot::default()
            }
        };
        info!(
            "[Session] Started with {} sign(s), dwell {:?}, phrases up to {} word(s)",
            snapshot.len(),
            settings.dwell,
            settings.max_phrase_words
        );

        Self {
            inner: Arc::new(Inner {
                settings,
                library: SharedLibrary::new(snapshot),
                store,
                state: Mutex::new(CoreState::default()),
                completion: CompletionSlot::new(),
                callback,
            }),
        }
    }

    fn spawn_drain(&self, epoch: Option<u64>) {
        if let Some(epoch) = epoch {
            tokio::spawn(drain(self.inner.clone(), epoch));
        }
    }

    // === Speech input ===

    /// Feed one finalized transcript segment into the pipeline.
    pub fn submit_final(&self, text: &str) {
        let text = text.trim();
        let tokens = tokenize(text);
        let outcome = match_tokens(
            &tokens,
            &self.inner.library.snapshot(),
            self.inner.settings.max_phrase_words,
        );
        debug!(
            "[Session] Segment {:?} -> {} unit(s), {} missing",
            text,
            outcome.units.len(),
            outcome.missing.len()
        );

        let epoch = self.inner.update(|state, changes| {
            if !text.is_empty() {
                if !state.transcript.is_empty() {
                    state.transcript.push(' ');
                }
                state.transcript.push_str(text);
            }
            state.interim.clear();
            changes.transcript = true;

            state.apply(ReviewEvent::SpeechFinalized);
            state.sequencer.enqueue(outcome.units);

            // The library may have changed since matching; never record a
            // word it can already show.
            let snapshot = self.inner.library.snapshot();
            let added = state
                .missing
                .extend(outcome.missing.iter().filter(|w| !snapshot.contains(w)));
            if added > 0 {
                changes.missing = true;
            }

            state.schedule_drain()
        });
        self.spawn_drain(epoch);
    }

    /// Update the interim (not yet final) transcript. Display only.
    pub fn set_interim(&self, text: &str) {
        let text = text.trim();
        self.inner.update(|state, changes| {
            if state.interim != text {
                state.interim = text.to_string();
                changes.transcript = true;
            }
        });
    }

    // === Renderer ===

    /// Report that unit `seq` finished displaying.
    ///
    /// Returns `false` when `seq` is not the unit currently awaited, so a late
    /// or duplicated signal never skips a later unit.
    pub fn display_complete(&self, seq: u64) -> bool {
        let resolved = self.inner.completion.complete(seq);
        if !resolved {
            debug!("[Session] Ignoring completion for unit {} (not pending)", seq);
        }
        resolved
    }

    // === Review ===

    /// Dismiss every pending missing word.
    pub fn skip_review(&self) {
        let epoch = self.inner.update(|state, changes| {
            if !state.missing.is_empty() {
                state.missing.clear();
                changes.missing = true;
            }
            state.apply(ReviewEvent::ReviewSkipped);
            state.schedule_drain()
        });
        info!("[Session] Review skipped");
        self.spawn_drain(epoch);
    }

    /// Ask the authoring collaborator for a sign for `word`.
    pub fn request_authoring(&self, word: &str) {
        let word = normalize_key(word);
        if word.is_empty() {
            return;
        }
        info!("[Session] Authoring requested for '{}'", word);
        self.inner.callback.on_authoring_requested(&word);
    }

    /// The authoring collaborator finished with `word`, whether or not it
    /// saved anything. Returns whether the library now has the word.
    pub fn authoring_finished(&self, word: &str) -> bool {
        let word = normalize_key(word);
        let present = self.inner.library.snapshot().contains(&word);
        self.inner.update(|state, changes| {
            if present && state.missing.remove(&word) {
                changes.missing = true;
            }
            let missing_empty = state.missing.is_empty();
            state.apply(ReviewEvent::WordResolved { missing_empty });
        });
        present
    }

    // === Library ===

    /// Add or replace a sign. The in-memory library is updated first; a
    /// failed store write is reported but does not undo it.
    pub fn save_sign(
        &self,
        key: &str,
        payload: AssetPayload,
    ) -> Result<WriteOutcome, LibraryError> {
        let normalized = normalize_key(key);
        if normalized.is_empty() {
            return Err(LibraryError::InvalidKey(key.to_string()));
        }

        let asset = Asset::from_payload(payload);
        info!(
            "[Library] Saving '{}' ({}, {} bytes)",
            normalized,
            asset.kind(),
            asset.payload().len()
        );
        self.inner.library.insert(normalized.clone(), asset.clone());
        self.inner.prune_missing();

        Ok(self.persist(self.inner.store.put(&normalized, &asset), "save", &normalized))
    }

    /// Remove a sign.
    pub fn delete_sign(&self, key: &str) -> Result<WriteOutcome, LibraryError> {
        let normalized = normalize_key(key);
        if normalized.is_empty() {
            return Err(LibraryError::InvalidKey(key.to_string()));
        }

        info!("[Library] Deleting '{}'", normalized);
        self.inner.library.remove(&normalized);
        Ok(self.persist(self.inner.store.delete(&normalized), "delete", &normalized))
    }

    /// Re-fetch the whole library from the store. The previous snapshot is
    /// kept when the fetch fails.
    pub fn reload_library(&self) -> Result<usize, LibraryError> {
        let entries = self.inner.store.get_all()?;
        let snapshot = self.inner.library.replace(LibrarySnapshot::new(entries));
        info!("[Library] Reloaded {} sign(s)", snapshot.len());
        self.inner.prune_missing();
        Ok(snapshot.len())
    }

    fn persist(&self, result: Result<(), LibraryError>, action: &str, key: &str) -> WriteOutcome {
        match result {
            Ok(()) => WriteOutcome::Persisted,
            Err(e) => {
                warn!("[Library] Failed to {} '{}': {}", action, key, e);
                self.inner.callback.on_storage_warning(&format!(
                    "Could not {} '{}' to storage; the change may be lost on restart ({})",
                    action, key, e
                ));
                WriteOutcome::MemoryOnly
            }
        }
    }

    // === Lifecycle ===

    /// Mark whether speech capture is active.
    pub fn set_listening(&self, listening: bool) {
        self.inner.update(|state, _| state.listening = listening);
    }

    /// Report a capture failure to the user.
    pub fn report_capture_error(&self, message: &str) {
        self.inner.callback.on_capture_error(message);
    }

    /// End the listening session: discard queued units, missing words, and
    /// transcripts, and release any outstanding display wait.
    pub fn stop(&self) {
        let released = self.inner.update(|state, changes| {
            state.sequencer.reset();
            // Same critical section as the reset: a drain started after this
            // stop can only arm its wait once the lock is released.
            let released = self.inner.completion.cancel();
            if !state.missing.is_empty() {
                state.missing.clear();
                changes.missing = true;
            }
            state.transcript.clear();
            state.interim.clear();
            changes.transcript = true;
            state.listening = false;
            state.apply(ReviewEvent::SessionStopped);
            changes.display = Some(None);
            released
        });
        if released {
            debug!("[Session] Released outstanding display wait");
        }
        info!("[Session] Stopped");
    }

    // === Queries ===

    pub fn status(&self) -> SessionStatus {
        let state = self.inner.lock();
        SessionStatus {
            review_state: state.review,
            queue_depth: state.sequencer.queue_depth(),
            current: state.sequencer.current().cloned(),
            missing_words: state.missing.as_slice().to_vec(),
            listening: state.listening,
            transcript: state.transcript.clone(),
            interim: state.interim.clone(),
        }
    }

    pub fn review_state(&self) -> ReviewState {
        self.inner.lock().review
    }

    pub fn current_unit(&self) -> Option<PlayUnit> {
        self.inner.lock().sequencer.current().cloned()
    }

    pub fn missing_words(&self) -> Vec<String> {
        self.inner.lock().missing.as_slice().to_vec()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.lock().sequencer.queue_depth()
    }

    /// Whether playback is finished: nothing queued and no drain running.
    pub fn is_settled(&self) -> bool {
        self.inner.lock().sequencer.is_idle()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.lock().listening
    }

    /// Unit the sequencer is currently waiting on, if any.
    pub fn pending_completion(&self) -> Option<u64> {
        self.inner.completion.pending_seq()
    }

    /// Current library snapshot.
    pub fn library(&self) -> Arc<LibrarySnapshot> {
        self.inner.library.snapshot()
    }

    pub fn settings(&self) -> PlaybackSettings {
        self.inner.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibraryStore;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Display(Option<String>),
        Review(ReviewState),
        Authoring(String),
        StorageWarning,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn displayed(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Display(Some(key)) => Some(key),
                    _ => None,
                })
                .collect()
        }
    }

    impl SessionCallback for Recorder {
        fn on_display(&self, item: Option<&DisplayItem>) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Display(item.map(|i| i.unit.key.clone())));
        }

        fn on_review_changed(&self, state: ReviewState, _missing: &[String]) {
            self.events.lock().unwrap().push(Event::Review(state));
        }

        fn on_authoring_requested(&self, word: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Authoring(word.to_string()));
        }

        fn on_storage_warning(&self, _message: &str) {
            self.events.lock().unwrap().push(Event::StorageWarning);
        }
    }

    fn image() -> AssetPayload {
        AssetPayload::Bytes(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }

    fn video() -> AssetPayload {
        AssetPayload::Reference("data:video/webm;base64,GkXfo0".to_string())
    }

    fn store_with(entries: &[(&str, AssetPayload)]) -> Arc<MemoryLibraryStore> {
        Arc::new(MemoryLibraryStore::with_entries(entries.iter().map(
            |(key, payload)| (key.to_string(), Asset::from_payload(payload.clone())),
        )))
    }

    fn start(store: Arc<MemoryLibraryStore>) -> (Session, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let session = Session::start(PlaybackSettings::default(), store, recorder.clone());
        (session, recorder)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }

    /// Let spawned drain loops run without reaching any dwell deadline.
    async fn tick() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_units_display_in_order_then_review() {
        let (session, recorder) = start(store_with(&[("thank you", image()), ("much", image())]));

        session.submit_final("Thank you very much");
        assert_eq!(session.review_state(), ReviewState::Sequencing);
        settle().await;

        assert_eq!(recorder.displayed(), vec!["thank you", "very", "much"]);
        assert_eq!(session.missing_words(), vec!["very"]);
        assert_eq!(session.review_state(), ReviewState::Reviewing);
        assert!(session.current_unit().is_none());

        let events = recorder.events();
        let last_two = &events[events.len() - 2..];
        assert_eq!(
            last_two,
            &[Event::Display(None), Event::Review(ReviewState::Reviewing)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_dwells_for_configured_time() {
        let (session, recorder) = start(store_with(&[("hello", image())]));

        session.submit_final("hello");
        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(session.current_unit().map(|u| u.key), Some("hello".to_string()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(session.current_unit().is_none());
        assert_eq!(session.review_state(), ReviewState::Idle);
        assert_eq!(recorder.displayed(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_waits_for_renderer_signal() {
        let (session, _recorder) = start(store_with(&[("wave", video())]));

        session.submit_final("wave");
        settle().await;
        let unit = session.current_unit().expect("video still displayed");
        assert_eq!(unit.key, "wave");
        assert_eq!(session.pending_completion(), Some(unit.seq));

        assert!(!session.display_complete(unit.seq + 1));
        assert!(session.display_complete(unit.seq));
        assert!(!session.display_complete(unit.seq));
        settle().await;

        assert!(session.current_unit().is_none());
        assert_eq!(session.review_state(), ReviewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renderer_may_end_image_early() {
        let (session, _recorder) = start(store_with(&[("a", image()), ("b", image())]));

        session.submit_final("a b");
        tick().await;
        let first = session.current_unit().unwrap();
        assert!(session.display_complete(first.seq));
        tick().await;

        assert_eq!(session.current_unit().map(|u| u.key), Some("b".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_segments_during_playback_join_the_same_drain() {
        let (session, recorder) = start(store_with(&[]));

        session.submit_final("one two");
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.submit_final("three");
        session.submit_final("four");
        settle().await;

        assert_eq!(recorder.displayed(), vec!["one", "two", "three", "four"]);
        let clears = recorder
            .events()
            .into_iter()
            .filter(|e| *e == Event::Display(None))
            .count();
        assert_eq!(clears, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_words_deduplicated() {
        let (session, _recorder) = start(store_with(&[]));

        session.submit_final("cat cat dog cat");
        session.submit_final("Dog! bird");
        settle().await;

        assert_eq!(session.missing_words(), vec!["cat", "dog", "bird"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_speech_interrupts_review() {
        let (session, _recorder) = start(store_with(&[("hello", image())]));

        session.submit_final("zebra");
        settle().await;
        assert_eq!(session.review_state(), ReviewState::Reviewing);

        session.submit_final("hello");
        assert_eq!(session.review_state(), ReviewState::Sequencing);
        assert_eq!(session.missing_words(), vec!["zebra"]);

        settle().await;
        assert_eq!(session.review_state(), ReviewState::Reviewing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_segment_during_review_keeps_reviewing() {
        let (session, _recorder) = start(store_with(&[]));

        session.submit_final("zebra");
        settle().await;
        session.submit_final("   ");

        assert_eq!(session.review_state(), ReviewState::Reviewing);
        assert_eq!(session.queue_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saving_missing_word_resolves_it() {
        let store = store_with(&[]);
        let (session, _recorder) = start(store.clone());

        session.submit_final("cat dog");
        settle().await;
        assert_eq!(session.review_state(), ReviewState::Reviewing);

        assert_eq!(session.save_sign("Cat", image()).unwrap(), WriteOutcome::Persisted);
        assert_eq!(session.missing_words(), vec!["dog"]);
        assert_eq!(session.review_state(), ReviewState::Reviewing);
        assert!(store.contains("cat"));

        session.save_sign("dog.", video()).unwrap();
        assert!(session.missing_words().is_empty());
        assert_eq!(session.review_state(), ReviewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_word_is_not_missing_again() {
        let (session, _recorder) = start(store_with(&[]));

        session.submit_final("cat");
        settle().await;
        session.save_sign("cat", image()).unwrap();
        session.submit_final("cat");
        settle().await;

        assert!(session.missing_words().is_empty());
        assert_eq!(session.review_state(), ReviewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authoring_round_trip() {
        let (session, recorder) = start(store_with(&[]));

        session.submit_final("cat dog");
        settle().await;

        session.request_authoring("Dog");
        assert!(recorder.events().contains(&Event::Authoring("dog".to_string())));

        // Authoring closed without saving: nothing changes.
        assert!(!session.authoring_finished("dog"));
        assert_eq!(session.missing_words(), vec!["cat", "dog"]);
        assert_eq!(session.review_state(), ReviewState::Reviewing);

        session.save_sign("dog", video()).unwrap();
        assert!(session.authoring_finished("dog"));
        assert_eq!(session.missing_words(), vec!["cat"]);
        assert_eq!(session.review_state(), ReviewState::Reviewing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_review_clears_missing() {
        let (session, _recorder) = start(store_with(&[]));

        session.submit_final("zebra giraffe");
        settle().await;
        session.skip_review();

        assert!(session.missing_words().is_empty());
        assert_eq!(session.review_state(), ReviewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_during_playback_keeps_sequencing() {
        let (session, recorder) = start(store_with(&[]));

        session.submit_final("one two");
        tick().await;
        session.skip_review();
        assert_eq!(session.review_state(), ReviewState::Sequencing);
        assert!(session.missing_words().is_empty());

        settle().await;
        assert_eq!(recorder.displayed(), vec!["one", "two"]);
        assert_eq!(session.review_state(), ReviewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_everything_and_releases_wait() {
        let (session, recorder) = start(store_with(&[("wave", video())]));

        session.submit_final("wave hello there");
        tick().await;
        assert!(session.pending_completion().is_some());

        session.stop();
        let status = session.status();
        assert_eq!(status.queue_depth, 0);
        assert!(status.missing_words.is_empty());
        assert!(status.current.is_none());
        assert!(status.transcript.is_empty());
        assert_eq!(status.review_state, ReviewState::Idle);
        assert_eq!(session.pending_completion(), None);

        let displayed_at_stop = recorder.displayed().len();
        settle().await;
        assert_eq!(recorder.displayed().len(), displayed_at_stop);

        // A fresh segment starts a fresh drain.
        session.submit_final("hello");
        settle().await;
        assert_eq!(recorder.displayed().last().map(String::as_str), Some("hello"));
        assert_eq!(session.missing_words(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_started_after_stop_keeps_its_wait() {
        let (session, recorder) = start(store_with(&[("wave", video())]));

        session.submit_final("wave");
        tick().await;
        let old = session.pending_completion().expect("first video awaited");

        session.stop();
        session.submit_final("wave");
        tick().await;

        let new = session.pending_completion().expect("second video awaited");
        assert!(new > old);
        assert_eq!(session.current_unit().map(|u| u.seq), Some(new));

        // Still waiting on the renderer well past any dwell.
        settle().await;
        assert_eq!(session.pending_completion(), Some(new));
        assert!(!session.display_complete(old));
        assert!(session.display_complete(new));
        settle().await;

        assert!(session.current_unit().is_none());
        assert_eq!(recorder.displayed(), vec!["wave", "wave"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_racing_restart_never_cancels_new_wait() {
        for _ in 0..200 {
            let (session, _recorder) = start(store_with(&[("wave", video())]));
            session.submit_final("wave");
            tokio::time::sleep(Duration::from_millis(1)).await;

            let stopper = {
                let session = session.clone();
                tokio::spawn(async move { session.stop() })
            };
            let restarter = {
                let session = session.clone();
                tokio::spawn(async move { session.submit_final("wave") })
            };
            stopper.await.unwrap();
            restarter.await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;

            // A segment that landed after the stop survives it, and its video
            // is still awaited rather than skipped.
            if !session.status().transcript.is_empty() {
                let unit = session.current_unit().expect("restarted video displayed");
                assert_eq!(session.pending_completion(), Some(unit.seq));
            }
            session.stop();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_keeps_memory_copy() {
        let store = store_with(&[]);
        store.set_fail_writes(true);
        let (session, recorder) = start(store.clone());

        let outcome = session.save_sign("hello", image()).unwrap();

        assert_eq!(outcome, WriteOutcome::MemoryOnly);
        assert!(session.library().contains("hello"));
        assert!(!store.contains("hello"));
        assert!(recorder.events().contains(&Event::StorageWarning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_key_rejected() {
        let (session, _recorder) = start(store_with(&[]));
        assert!(matches!(
            session.save_sign("?!", image()),
            Err(LibraryError::InvalidKey(_))
        ));
        assert!(session.library().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_reload() {
        let store = store_with(&[("hello", image()), ("bye", image())]);
        let (session, _recorder) = start(store.clone());

        session.delete_sign("Hello").unwrap();
        assert!(!session.library().contains("hello"));
        assert!(!store.contains("hello"));

        session.submit_final("zebra");
        settle().await;
        store
            .put("zebra", &Asset::from_payload(image()))
            .unwrap();
        assert_eq!(session.reload_library().unwrap(), 2);
        assert!(session.missing_words().is_empty());
        assert_eq!(session.review_state(), ReviewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_accumulates() {
        let (session, _recorder) = start(store_with(&[]));

        session.set_interim("hel");
        assert_eq!(session.status().interim, "hel");
        session.submit_final(" hello ");
        session.submit_final("world");

        let status = session.status();
        assert_eq!(status.transcript, "hello world");
        assert!(status.interim.is_empty());
    }
}
