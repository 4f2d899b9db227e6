//! Speech capture boundary.
//!
//! A recognizer is wrapped as a [`SpeechSource`] that pushes [`SpeechEvent`]s
//! into a channel. [`CaptureSupervisor`] consumes that channel: finalized
//! segments go to the session, interim text goes to the transcript display,
//! and a recognizer that ends on its own is restarted while the session is
//! still listening.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use crate::session::Session;

/// Event produced by a speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Partial hypothesis for the segment in progress
    Interim(String),
    /// Finalized segment text
    Final(String),
    /// Recognizer reported an error
    Error(SpeechError),
    /// Recognizer stopped on its own
    Ended,
}

/// Recognizer failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("no speech detected")]
    NoSpeech,
    #[error("recognition aborted")]
    Aborted,
    #[error("microphone access denied")]
    PermissionDenied,
    #[error("speech recognition error: {0}")]
    Other(String),
}

/// How the supervisor treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected during normal use; ignored
    Transient,
    /// Shown to the user; capture continues
    Reported,
    /// Capture cannot continue
    Fatal,
}

impl SpeechError {
    /// Map a recognizer error code onto an error.
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => SpeechError::NoSpeech,
            "aborted" => SpeechError::Aborted,
            "not-allowed" | "service-not-allowed" => SpeechError::PermissionDenied,
            other => SpeechError::Other(other.to_string()),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SpeechError::NoSpeech | SpeechError::Aborted => ErrorSeverity::Transient,
            SpeechError::PermissionDenied => ErrorSeverity::Fatal,
            SpeechError::Other(_) => ErrorSeverity::Reported,
        }
    }
}

/// A recognizer that can be started and stopped.
///
/// Events are delivered through the channel handed to the source when it was
/// built, not through this trait.
pub trait SpeechSource: Send {
    /// Begin recognizing speech in `language` (a BCP-47 tag such as "en-US").
    fn start(&mut self, language: &str) -> Result<(), String>;
    fn stop(&mut self);
}

/// Recognizer parameters applied on every (re)start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Delay before restarting a recognizer that ended on its own
    pub restart_debounce: Duration,
    /// Language tag handed to [`SpeechSource::start`]
    pub language: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            restart_debounce: Duration::from_millis(
                signflow_common::config::DEFAULT_RESTART_DEBOUNCE_MS,
            ),
            language: signflow_common::config::DEFAULT_RECOGNITION_LANGUAGE.to_string(),
        }
    }
}

/// Why a supervisor returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    /// The event channel closed
    Closed,
    /// The session stopped listening
    Stopped,
    /// A fatal recognizer error ended the session
    Fatal(SpeechError),
    /// The recognizer could not be started
    StartFailed(String),
}

/// Drives a [`SpeechSource`] on behalf of a session.
pub struct CaptureSupervisor<S: SpeechSource> {
    source: S,
    session: Session,
    settings: CaptureSettings,
}

impl<S: SpeechSource> CaptureSupervisor<S> {
    pub fn new(source: S, session: Session, settings: CaptureSettings) -> Self {
        Self {
            source,
            session,
            settings,
        }
    }

    /// Start the recognizer and consume its events until capture ends.
    ///
    /// Capture ends when the channel closes, on a fatal error, or once the
    /// session has been stopped. Speech arriving after a stop is dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<SpeechEvent>) -> CaptureExit {
        if let Err(e) = self.source.start(&self.settings.language) {
            return self.start_failed(e);
        }
        self.session.set_listening(true);
        info!("[Capture] Listening ({})", self.settings.language);

        let mut restart: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("[Capture] Event channel closed");
                        self.source.stop();
                        self.session.set_listening(false);
                        return CaptureExit::Closed;
                    };
                    match event {
                        SpeechEvent::Interim(_) | SpeechEvent::Final(_)
                            if !self.session.is_listening() =>
                        {
                            info!("[Capture] Session stopped, stopping recognizer");
                            self.source.stop();
                            return CaptureExit::Stopped;
                        }
                        SpeechEvent::Interim(text) => self.session.set_interim(&text),
                        SpeechEvent::Final(text) => self.session.submit_final(&text),
                        SpeechEvent::Ended => {
                            if !self.session.is_listening() {
                                info!("[Capture] Recognizer ended after stop");
                                return CaptureExit::Stopped;
                            }
                            let debounce = self.settings.restart_debounce;
                            debug!("[Capture] Recognizer ended, restarting in {:?}", debounce);
                            restart = Some(Box::pin(tokio::time::sleep(debounce)));
                        }
                        SpeechEvent::Error(e) => match e.severity() {
                            ErrorSeverity::Transient => debug!("[Capture] {}", e),
                            ErrorSeverity::Reported => {
                                warn!("[Capture] {}", e);
                                self.session.report_capture_error(&e.to_string());
                            }
                            ErrorSeverity::Fatal => {
                                error!("[Capture] {}", e);
                                self.source.stop();
                                self.session.stop();
                                self.session.report_capture_error(&e.to_string());
                                return CaptureExit::Fatal(e);
                            }
                        },
                    }
                }
                _ = restart_due(&mut restart) => {
                    restart = None;
                    if !self.session.is_listening() {
                        return CaptureExit::Stopped;
                    }
                    if let Err(e) = self.source.start(&self.settings.language) {
                        return self.start_failed(e);
                    }
                    debug!("[Capture] Recognizer restarted");
                }
            }
        }
    }

    fn start_failed(&mut self, message: String) -> CaptureExit {
        error!("[Capture] Failed to start recognizer: {}", message);
        self.session.set_listening(false);
        self.session
            .report_capture_error(&format!("Could not start speech recognition: {}", message));
        CaptureExit::StartFailed(message)
    }
}

/// Resolves when the pending restart timer fires; never resolves without one.
fn restart_due(timer: &mut Option<Pin<Box<Sleep>>>) -> impl Future<Output = ()> + '_ {
    async move {
        match timer {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
