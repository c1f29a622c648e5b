//! Debounced autosave.
//!
//! The scheduler is a single-slot deadline register: every change replaces
//! the slot with `now + interval`, and only when a deadline passes untouched
//! does the owner call [`AutosaveScheduler::fire`]. Encoded snapshots are
//! handed to one writer task that processes them in order, so writes never
//! overlap. Outcomes go out on a broadcast channel nobody is required to
//! listen to.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec;
use crate::error::PersistenceError;
use crate::model::Document;

/// Outcome of one durable write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveReport {
    Saved { path: PathBuf, bytes: usize },
    Failed(PersistenceError),
}

struct Writer {
    jobs: mpsc::UnboundedSender<Vec<u8>>,
    handle: JoinHandle<()>,
}

pub struct AutosaveScheduler {
    interval: Duration,
    deadline: Option<Instant>,
    writer: Option<Writer>,
    reports: broadcast::Sender<AutosaveReport>,
}

impl AutosaveScheduler {
    /// Create a scheduler writing to `destination`. With no destination every
    /// call is a no-op. Must be called inside a tokio runtime.
    pub fn new(
        interval: Duration,
        destination: Option<PathBuf>,
        reports: broadcast::Sender<AutosaveReport>,
    ) -> Self {
        let writer = destination.map(|path| {
            let (jobs, rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(run_writer(path, rx, reports.clone()));
            Writer { jobs, handle }
        });
        if writer.is_none() {
            warn!("No autosave destination available; autosave disabled");
        }

        Self {
            interval,
            deadline: None,
            writer,
            reports,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel any pending write and schedule a new one `interval` from now.
    pub fn schedule(&mut self) {
        if self.writer.is_some() {
            self.deadline = Some(Instant::now() + self.interval);
        }
    }

    /// Write `document` now and clear the pending slot.
    pub fn fire(&mut self, document: &Document) {
        self.deadline = None;
        let Some(writer) = &self.writer else {
            return;
        };

        match codec::encode(document) {
            Ok(bytes) => {
                if writer.jobs.send(bytes).is_err() {
                    warn!("Autosave writer has stopped; change not saved");
                }
            }
            Err(e) => {
                warn!("Autosave couldn't encode document: {}", e);
                let _ = self.reports.send(AutosaveReport::Failed(e.into()));
            }
        }
    }

    /// Write immediately if a change is pending.
    pub fn flush(&mut self, document: &Document) {
        if self.is_pending() {
            self.fire(document);
        }
    }

    /// Stop accepting writes and wait for queued ones to finish.
    pub async fn shutdown(self) {
        if let Some(Writer { jobs, handle }) = self.writer {
            drop(jobs);
            if let Err(e) = handle.await {
                warn!("Autosave writer ended abnormally: {}", e);
            }
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
pub(crate) async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn run_writer(
    path: PathBuf,
    mut jobs: mpsc::UnboundedReceiver<Vec<u8>>,
    reports: broadcast::Sender<AutosaveReport>,
) {
    while let Some(bytes) = jobs.recv().await {
        let report = match write_replacing(&path, &bytes).await {
            Ok(()) => {
                info!("Autosaved {} bytes to {}", bytes.len(), path.display());
                AutosaveReport::Saved {
                    path: path.clone(),
                    bytes: bytes.len(),
                }
            }
            Err(e) => {
                warn!("Autosave failed: {}", e);
                AutosaveReport::Failed(e)
            }
        };
        let _ = reports.send(report);
    }
}

/// Write to a sibling temp file, then rename over `path`.
async fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let io_err = |e: std::io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;

    fn doc_with(n: usize) -> Document {
        let mut doc = Document::new();
        for i in 0..n {
            doc.add_element(format!("e{}", i), Position::new(i as i32, 0), 10).unwrap();
        }
        doc
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_replaces_the_pending_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = broadcast::channel(8);
        let mut scheduler =
            AutosaveScheduler::new(Duration::from_secs(5), Some(dir.path().join("a.emojiart")), tx);

        assert!(!scheduler.is_pending());
        scheduler.schedule();
        let first = scheduler.deadline().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        scheduler.schedule();
        let second = scheduler.deadline().unwrap();
        assert_eq!(second - first, Duration::from_secs(2));
        assert_eq!(second, Instant::now() + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn fire_writes_the_encoded_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("Autosaved.emojiart");
        let (tx, mut rx) = broadcast::channel(8);
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(5), Some(path.clone()), tx);

        let doc = doc_with(3);
        scheduler.schedule();
        scheduler.fire(&doc);
        assert!(!scheduler.is_pending());

        let report = rx.recv().await.unwrap();
        let expected = codec::encode(&doc).unwrap();
        assert_eq!(
            report,
            AutosaveReport::Saved {
                path: path.clone(),
                bytes: expected.len()
            }
        );
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn io_failures_are_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // parent "directory" is a regular file
        let path = blocker.join("Autosaved.emojiart");

        let (tx, mut rx) = broadcast::channel(8);
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(5), Some(path), tx);
        scheduler.schedule();
        scheduler.fire(&doc_with(1));

        assert!(matches!(
            rx.recv().await.unwrap(),
            AutosaveReport::Failed(PersistenceError::Io { .. })
        ));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn flush_only_writes_when_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.emojiart");
        let (tx, _rx) = broadcast::channel(8);
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(5), Some(path.clone()), tx);

        scheduler.flush(&doc_with(1));
        scheduler.schedule();
        scheduler.flush(&doc_with(2));
        scheduler.shutdown().await;

        assert_eq!(std::fs::read(&path).unwrap(), codec::encode(&doc_with(2)).unwrap());
    }

    #[tokio::test]
    async fn disabled_scheduler_never_pends() {
        let (tx, _rx) = broadcast::channel(8);
        let mut scheduler = AutosaveScheduler::new(Duration::from_secs(5), None, tx);
        assert!(!scheduler.is_enabled());
        scheduler.schedule();
        assert!(!scheduler.is_pending());
        scheduler.fire(&doc_with(1));
        scheduler.shutdown().await;
    }
}
