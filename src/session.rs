//! Session: the single owner of a document.
//!
//! A spawned owner task holds the [`Document`], the autosave scheduler and the
//! background fetcher. [`Session`] handles talk to it over a command channel,
//! so intents from any task are applied one at a time in arrival order.
//! Remote fetches complete on their own tasks and post a command back onto
//! the same channel; that is the only way they reach published state.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::autosave::{self, AutosaveReport, AutosaveScheduler};
use crate::codec;
use crate::decode::BackgroundImage;
use crate::fetcher::{BackgroundFetcher, FetchCompletion, FetchStatus};
use crate::loader::{ResourceLoader, UrlLoader};
use crate::model::{Background, Change, Document, Element, ElementId, Position};
use crate::{Error, Result, SessionConfig};

const REPORT_CAPACITY: usize = 16;

/// Published state, replaced after every change
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Number of mutations applied since the session opened
    pub version: u64,
    pub document: Arc<Document>,
    pub background_image: Option<BackgroundImage>,
    pub fetch_status: FetchStatus,
}

enum Command {
    AddElement(String, Position, i32, oneshot::Sender<Result<ElementId>>),
    MoveElement(ElementId, Position, oneshot::Sender<Result<()>>),
    ResizeElement(ElementId, f64, oneshot::Sender<Result<()>>),
    RemoveElement(ElementId, oneshot::Sender<bool>),
    SetBackground(Background, oneshot::Sender<()>),
    FetchCompleted(FetchCompletion),
    Close(oneshot::Sender<()>),
}

/// Handle to an open document session. Cheap to clone; the owner task stops
/// when [`Session::close`] is called or every handle is dropped, flushing a
/// pending autosave either way.
#[derive(Clone)]
pub struct Session {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    reports: broadcast::Sender<AutosaveReport>,
}

impl Session {
    /// Open a session using the default [`UrlLoader`] for remote backgrounds.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let loader = UrlLoader::new(&config)?;
        Self::open_with_loader(config, Arc::new(loader)).await
    }

    /// Open a session with a host-supplied resource loader.
    ///
    /// When `restore_autosave` is set and the autosave file exists it is
    /// decoded and its background resolved; an unreadable or corrupt file
    /// yields an empty document.
    pub async fn open_with_loader(config: SessionConfig, loader: Arc<dyn ResourceLoader>) -> Result<Self> {
        let document = match (&config.autosave_path, config.restore_autosave) {
            (Some(path), true) => restore(path).await,
            _ => Document::new(),
        };

        let document = Arc::new(document);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let (published, snapshots) = watch::channel(Snapshot {
            version: 0,
            document: document.clone(),
            background_image: None,
            fetch_status: FetchStatus::Idle,
        });

        let mut owner = Owner {
            document,
            version: 0,
            autosave: AutosaveScheduler::new(
                config.coalescing_interval,
                config.autosave_path.clone(),
                reports.clone(),
            ),
            fetcher: BackgroundFetcher::new(loader),
            published,
            self_tx: cmd_tx.downgrade(),
        };
        if !matches!(owner.document.background(), Background::Blank) {
            owner.trigger_fetch();
            owner.publish();
        }

        tokio::spawn(run(owner, cmd_rx));

        Ok(Self {
            cmd_tx,
            snapshots,
            reports,
        })
    }

    /// Place a new element; returns its id.
    pub async fn add_element(
        &self,
        content: impl Into<String>,
        position: impl Into<Position>,
        size: i32,
    ) -> Result<ElementId> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::AddElement(content.into(), position.into(), size, tx))?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Offset an element on both axes. A missing id yields a not-found error
    /// (see [`Error::is_not_found`]) and changes nothing.
    pub async fn move_element(&self, id: ElementId, delta: impl Into<Position>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::MoveElement(id, delta.into(), tx))?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    pub async fn resize_element(&self, id: ElementId, scale: f64) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ResizeElement(id, scale, tx))?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Returns whether an element was removed.
    pub async fn remove_element(&self, id: ElementId) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RemoveElement(id, tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    pub async fn set_background(&self, background: Background) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SetBackground(background, tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Latest published state
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified whenever published state changes
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn elements(&self) -> Vec<Element> {
        self.snapshots.borrow().document.elements().to_vec()
    }

    pub fn background(&self) -> Background {
        self.snapshots.borrow().document.background().clone()
    }

    pub fn background_image(&self) -> Option<BackgroundImage> {
        self.snapshots.borrow().background_image.clone()
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.snapshots.borrow().fetch_status.clone()
    }

    /// Autosave outcomes from now on. Lagging receivers lose old reports.
    pub fn autosave_reports(&self) -> broadcast::Receiver<AutosaveReport> {
        self.reports.subscribe()
    }

    /// Flush a pending autosave, wait for it to hit disk and stop the owner.
    /// Other handles get [`Error::SessionClosed`] afterwards.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close(tx)).is_err() {
            return Ok(());
        }
        // a dropped reply means another handle closed the session first
        let _ = rx.await;
        Ok(())
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| Error::SessionClosed)
    }
}

async fn restore(path: &Path) -> Document {
    match tokio::fs::read(path).await {
        Ok(bytes) => match codec::decode(&bytes) {
            Ok(document) => {
                info!("Restored {} elements from {}", document.len(), path.display());
                document
            }
            Err(e) => {
                warn!("Ignoring unreadable autosave {}: {}", path.display(), e);
                Document::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
        Err(e) => {
            warn!("Couldn't read autosave {}: {}", path.display(), e);
            Document::new()
        }
    }
}

struct Owner {
    document: Arc<Document>,
    version: u64,
    autosave: AutosaveScheduler,
    fetcher: BackgroundFetcher,
    published: watch::Sender<Snapshot>,
    self_tx: mpsc::WeakUnboundedSender<Command>,
}

async fn run(mut owner: Owner, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    loop {
        let deadline = owner.autosave.deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Close(resp)) => {
                    owner.shutdown().await;
                    let _ = resp.send(());
                    return;
                }
                Some(cmd) => owner.handle(cmd),
                None => break,
            },
            _ = autosave::wait_for(deadline) => {
                owner.autosave.fire(&owner.document);
            }
        }
    }
    owner.shutdown().await;
}

impl Owner {
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::AddElement(content, position, size, resp) => {
                let id = ElementId(self.document.next_id());
                let res = Arc::make_mut(&mut self.document).add_element(content, position, size);
                let _ = resp.send(self.settle(res).map(|()| id));
            }
            Command::MoveElement(id, delta, resp) => {
                let res = Arc::make_mut(&mut self.document).move_element(id, delta);
                let _ = resp.send(self.settle(res));
            }
            Command::ResizeElement(id, scale, resp) => {
                let res = Arc::make_mut(&mut self.document).resize_element(id, scale);
                let _ = resp.send(self.settle(res));
            }
            Command::RemoveElement(id, resp) => {
                let removed = match Arc::make_mut(&mut self.document).remove_element(id) {
                    Some(change) => {
                        self.changed(change);
                        true
                    }
                    None => false,
                };
                let _ = resp.send(removed);
            }
            Command::SetBackground(background, resp) => {
                info!("Background set to {}", background);
                let change = Arc::make_mut(&mut self.document).set_background(background);
                self.changed(change);
                let _ = resp.send(());
            }
            Command::FetchCompleted(completion) => {
                if self.fetcher.complete(completion, self.document.background()) {
                    self.publish();
                }
            }
            Command::Close(_) => unreachable!("close is handled by the run loop"),
        }
    }

    fn settle(&mut self, res: std::result::Result<Change, crate::ModelError>) -> Result<()> {
        match res {
            Ok(change) => {
                self.changed(change);
                Ok(())
            }
            Err(e) => {
                debug!("Mutation not applied: {}", e);
                Err(e.into())
            }
        }
    }

    /// Change notification: reschedule autosave, re-resolve the background
    /// if it differs, publish.
    fn changed(&mut self, change: Change) {
        self.version += 1;
        self.autosave.schedule();
        if change.background_changed() {
            self.trigger_fetch();
        }
        self.publish();
    }

    fn trigger_fetch(&mut self) {
        let tx = self.self_tx.clone();
        self.fetcher.trigger(self.document.background(), move |completion| {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::FetchCompleted(completion));
            }
        });
    }

    fn publish(&self) {
        self.published.send_replace(Snapshot {
            version: self.version,
            document: self.document.clone(),
            background_image: self.fetcher.image().cloned(),
            fetch_status: self.fetcher.status().clone(),
        });
    }

    async fn shutdown(mut self) {
        self.autosave.flush(&self.document);
        self.autosave.shutdown().await;
        debug!("Session owner stopped");
    }
}
