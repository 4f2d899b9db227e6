//! SignFlow Engine
//!
//! Core engine for SignFlow speech-to-sign playback. Turns finalized speech
//! segments into an ordered stream of sign assets, plays them one at a time,
//! and collects the words the sign library cannot show yet for review.
//!
//! Front ends create a [`Session`], feed it speech (directly or through a
//! [`speech::CaptureSupervisor`]), and render what [`SessionCallback`]
//! reports.

pub mod config;
pub mod library;
pub mod logging;
pub mod matcher;
pub mod missing;
pub mod review;
pub mod sequencer;
pub mod session;
pub mod speech;
pub mod text;

pub use library::{JsonLibraryStore, LibraryError, LibrarySnapshot, LibraryStore, MemoryLibraryStore};
pub use review::ReviewState;
pub use session::{NoopCallback, PlaybackSettings, Session, SessionCallback, WriteOutcome};
pub use signflow_common::{Asset, AssetKind, AssetPayload, DisplayItem, PlayUnit, SessionStatus};

use std::sync::Arc;
use tracing::info;

/// Start a session backed by the JSON library file named in `config`.
///
/// Must be called from within a Tokio runtime.
pub fn open_session(config: &config::Config, callback: Arc<dyn SessionCallback>) -> Session {
    let path = config.library_file();
    info!(
        "SignFlow Engine starting (pid: {}, runtime mode: {:?})",
        std::process::id(),
        signflow_common::runtime_mode()
    );
    let store = Arc::new(JsonLibraryStore::open(&path));
    Session::start(PlaybackSettings::from(config), store, callback)
}
