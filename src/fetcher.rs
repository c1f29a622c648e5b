//! Background resolution state machine.
//!
//! `Idle -> Fetching -> {Idle, Failed}`. Remote retrievals run on their own
//! task and hand their result back through a completion callback; the owner
//! feeds it to [`BackgroundFetcher::complete`] together with the background
//! that is current *at that moment*, which is where stale results get dropped.

use std::sync::Arc;

use log::{debug, warn};
use url::Url;

use crate::decode::{decode_image, BackgroundImage};
use crate::error::FetchError;
use crate::loader::ResourceLoader;
use crate::model::Background;

/// Data URL reported when embedded image bytes fail to decode
pub const EMBEDDED_IMAGE_URL: &str = "data:application/octet-stream,embedded-background";

/// Resolution state of the current background
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Fetching,
    Failed(Url),
}

/// Result of one remote retrieval, posted back to the owner
#[derive(Debug)]
pub struct FetchCompletion {
    pub url: Url,
    pub result: Result<BackgroundImage, FetchError>,
}

pub struct BackgroundFetcher {
    loader: Arc<dyn ResourceLoader>,
    status: FetchStatus,
    image: Option<BackgroundImage>,
}

impl BackgroundFetcher {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            status: FetchStatus::Idle,
            image: None,
        }
    }

    pub fn status(&self) -> &FetchStatus {
        &self.status
    }

    pub fn image(&self) -> Option<&BackgroundImage> {
        self.image.as_ref()
    }

    /// Start resolving `background`. Any previously resolved image is
    /// dropped first. For URL backgrounds the retrieval is spawned on the
    /// current tokio runtime and `on_complete` runs on that task once it
    /// finishes; it must route the completion back to the owner.
    pub fn trigger<F>(&mut self, background: &Background, on_complete: F)
    where
        F: FnOnce(FetchCompletion) + Send + 'static,
    {
        self.image = None;

        match background {
            Background::Blank => {
                self.status = FetchStatus::Idle;
            }
            Background::ImageData(bytes) => match decode_image(bytes) {
                Ok(image) => {
                    self.image = Some(image);
                    self.status = FetchStatus::Idle;
                }
                Err(e) => {
                    warn!("Embedded background image is unusable: {}", e);
                    self.status = FetchStatus::Failed(embedded_image_url());
                }
            },
            Background::Url(url) => {
                self.status = FetchStatus::Fetching;
                let url = url.clone();
                let load = self.loader.load(&url);
                debug!("Fetching background {}", url);
                tokio::spawn(async move {
                    let result = match load.await {
                        Ok(bytes) => decode_image(&bytes),
                        Err(e) => Err(e),
                    };
                    on_complete(FetchCompletion { url, result });
                });
            }
        }
    }

    /// Apply a finished retrieval if `current` still points at the same URL.
    /// Returns whether published state changed.
    pub fn complete(&mut self, completion: FetchCompletion, current: &Background) -> bool {
        if current.url() != Some(&completion.url) {
            debug!("Discarding stale background fetch for {}", completion.url);
            return false;
        }

        match completion.result {
            Ok(image) => {
                debug!(
                    "Background {} resolved ({}x{})",
                    completion.url, image.width, image.height
                );
                self.image = Some(image);
                self.status = FetchStatus::Idle;
            }
            Err(e) => {
                warn!("Background fetch for {} failed: {}", completion.url, e);
                self.image = None;
                self.status = FetchStatus::Failed(completion.url);
            }
        }
        true
    }
}

fn embedded_image_url() -> Url {
    Url::parse(EMBEDDED_IMAGE_URL).expect("embedded image data URL is a valid constant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::png_fixture;
    use futures::future::{BoxFuture, FutureExt};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MapLoader {
        responses: HashMap<String, Result<Vec<u8>, FetchError>>,
        calls: AtomicUsize,
    }

    impl ResourceLoader for MapLoader {
        fn load(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let res = self
                .responses
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Status(404)));
            futures::future::ready(res).boxed()
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn fetcher_with(responses: Vec<(&str, Result<Vec<u8>, FetchError>)>) -> (BackgroundFetcher, Arc<MapLoader>) {
        let loader = Arc::new(MapLoader {
            responses: responses.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: AtomicUsize::new(0),
        });
        (BackgroundFetcher::new(loader.clone()), loader)
    }

    #[tokio::test]
    async fn blank_background_is_idle_without_fetching() {
        let (mut fetcher, loader) = fetcher_with(vec![]);
        fetcher.trigger(&Background::Blank, |_| panic!("no completion expected"));
        assert_eq!(fetcher.status(), &FetchStatus::Idle);
        assert!(fetcher.image().is_none());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedded_bytes_decode_synchronously() {
        let (mut fetcher, loader) = fetcher_with(vec![]);
        fetcher.trigger(&Background::ImageData(png_fixture(3, 2)), |_| panic!("no fetch"));
        assert_eq!(fetcher.status(), &FetchStatus::Idle);
        assert_eq!(fetcher.image().map(|i| (i.width, i.height)), Some((3, 2)));

        fetcher.trigger(&Background::ImageData(b"junk".to_vec()), |_| panic!("no fetch"));
        assert_eq!(fetcher.status(), &FetchStatus::Failed(url(EMBEDDED_IMAGE_URL)));
        assert!(fetcher.image().is_none());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn url_background_fetches_and_resolves() {
        let target = "https://example.com/bg.png";
        let (mut fetcher, _) = fetcher_with(vec![(target, Ok(png_fixture(4, 4)))]);
        let background = Background::Url(url(target));
        let (tx, mut rx) = mpsc::unbounded_channel();

        fetcher.trigger(&background, move |c| {
            let _ = tx.send(c);
        });
        assert_eq!(fetcher.status(), &FetchStatus::Fetching);

        let completion = rx.recv().await.unwrap();
        assert!(fetcher.complete(completion, &background));
        assert_eq!(fetcher.status(), &FetchStatus::Idle);
        assert_eq!(fetcher.image().map(|i| i.width), Some(4));
    }

    #[tokio::test]
    async fn undecodable_or_failed_fetch_marks_failed() {
        let garbage = "https://example.com/garbage";
        let missing = "https://example.com/missing";
        let (mut fetcher, _) = fetcher_with(vec![(garbage, Ok(b"<html>".to_vec()))]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for target in [garbage, missing] {
            let background = Background::Url(url(target));
            let tx = tx.clone();
            fetcher.trigger(&background, move |c| {
                let _ = tx.send(c);
            });
            let completion = rx.recv().await.unwrap();
            assert!(completion.result.is_err());
            assert!(fetcher.complete(completion, &background));
            assert_eq!(fetcher.status(), &FetchStatus::Failed(url(target)));
            assert!(fetcher.image().is_none());
        }
    }

    #[tokio::test]
    async fn stale_completion_is_ignored() {
        let (mut fetcher, _) = fetcher_with(vec![]);
        fetcher.trigger(&Background::Blank, |_| {});

        let stale = FetchCompletion {
            url: url("https://example.com/old.png"),
            result: Ok(BackgroundImage {
                width: 1,
                height: 1,
                rgba8: Arc::new(vec![0; 4]),
            }),
        };
        let current = Background::Url(url("https://example.com/new.png"));
        assert!(!fetcher.complete(stale, &current));
        assert_eq!(fetcher.status(), &FetchStatus::Idle);
        assert!(fetcher.image().is_none());
    }

    #[tokio::test]
    async fn retrigger_clears_previous_image() {
        let (mut fetcher, _) = fetcher_with(vec![]);
        fetcher.trigger(&Background::ImageData(png_fixture(1, 1)), |_| {});
        assert!(fetcher.image().is_some());

        fetcher.trigger(&Background::Url(url("https://example.com/next.png")), |_| {});
        assert!(fetcher.image().is_none());
        assert_eq!(fetcher.status(), &FetchStatus::Fetching);
    }
}
