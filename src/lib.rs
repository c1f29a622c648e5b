//! EmojiArt document engine
//!
//! State management for a sticker canvas editor: users place, move and resize
//! text/emoji elements over a background that is blank, a remote image or
//! embedded image bytes. Rendering and gestures live elsewhere; this crate
//! owns the document and everything that has to happen when it changes.
//!
//! # Features
//!
//! - **Document model**: validated mutations that emit explicit change
//!   notifications
//! - **Autosave**: bursts of edits are coalesced into a single durable write
//!   after a quiet interval
//! - **Background fetching**: remote images load off the owner task, and a
//!   result is applied only if its background is still current
//!
//! # Example
//!
//! ```no_run
//! use emojiart::{Background, Position, Session, SessionConfig};
//!
//! # async fn demo() -> emojiart::Result<()> {
//! let session = Session::open(SessionConfig::default()).await?;
//!
//! let id = session.add_element("😀", (0, 0), 40).await?;
//! session.move_element(id, Position::new(10, -5)).await?;
//! session.resize_element(id, 1.5).await?;
//! session
//!     .set_background(Background::Url("https://example.com/bg.jpg".parse().unwrap()))
//!     .await?;
//!
//! println!("status: {:?}", session.fetch_status());
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod autosave;
pub mod codec;
pub mod decode;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod model;
pub mod session;

pub use autosave::AutosaveReport;
pub use decode::BackgroundImage;
pub use error::{CodecError, Error, FetchError, ModelError, PersistenceError, Result};
pub use fetcher::FetchStatus;
pub use loader::{ResourceLoader, UrlLoader};
pub use model::{Background, Change, Document, Element, ElementId, ElementsChanged, Position};
pub use session::{Session, Snapshot};

/// File name of the autosave blob inside the user's documents directory
pub const AUTOSAVE_FILENAME: &str = "Autosaved.emojiart";

/// Per-user autosave location: the documents directory, falling back to the
/// home directory. `None` when neither can be determined.
pub fn default_autosave_path() -> Option<PathBuf> {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(AUTOSAVE_FILENAME))
}

/// Configuration for a document session
///
/// The defaults mirror a desktop editor: autosave into the user's documents
/// directory five seconds after the last edit, restore that file on open,
/// and give a background download thirty seconds.
///
/// # Examples
///
/// ```
/// let cfg = emojiart::SessionConfig::default();
/// assert_eq!(cfg.coalescing_interval.as_secs(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where autosaves go; `None` disables autosave
    pub autosave_path: Option<PathBuf>,
    /// Quiet period after the last change before the document is written
    pub coalescing_interval: Duration,
    /// Timeout for one background download in milliseconds
    pub fetch_timeout_ms: u64,
    /// User agent sent with background downloads
    pub user_agent: String,
    /// Whether `Session::open` loads the document found at `autosave_path`
    pub restore_autosave: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_path: default_autosave_path(),
            coalescing_interval: Duration::from_secs(5),
            fetch_timeout_ms: 30000,
            user_agent: format!("emojiart/{}", env!("CARGO_PKG_VERSION")),
            restore_autosave: true,
        }
    }
}

impl SessionConfig {
    /// Autosave to and restore from `path`
    pub fn with_autosave_path(path: impl Into<PathBuf>) -> Self {
        Self {
            autosave_path: Some(path.into()),
            ..Default::default()
        }
    }
}
