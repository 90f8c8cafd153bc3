//! Meetings listing with last-write-wins refetch.
//!
//! Every filter change starts a new fetch and cancels the one in flight. A
//! fetch result is only applied if no newer refresh was started meanwhile, so
//! the displayed list always belongs to the latest filter state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::filter::FilterState;
use crate::models::{Meeting, Page};

/// Where the listing gets its pages from.
#[async_trait]
pub trait ListingSource: Send + Sync + 'static {
    async fn fetch(&self, filters: &FilterState) -> anyhow::Result<Page<Meeting>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListingView {
    Idle,
    Loading { filters: FilterState },
    Ready { filters: FilterState, page: Page<Meeting> },
    Failed { filters: FilterState, message: String },
}

impl ListingView {
    pub fn filters(&self) -> Option<&FilterState> {
        match self {
            ListingView::Idle => None,
            ListingView::Loading { filters }
            | ListingView::Ready { filters, .. }
            | ListingView::Failed { filters, .. } => Some(filters),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Result became the displayed list.
    Applied,
    /// Finished, but a newer refresh had started; result discarded.
    Superseded,
    /// Cancelled before finishing.
    Cancelled,
}

#[derive(Debug)]
struct Inner {
    generation: u64,
    in_flight: Option<CancellationToken>,
    view: ListingView,
}

pub struct ListingController<S> {
    source: Arc<S>,
    inner: Arc<Mutex<Inner>>,
}

impl<S> Clone for ListingController<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: ListingSource> ListingController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                in_flight: None,
                view: ListingView::Idle,
            })),
        }
    }

    pub fn view(&self) -> ListingView {
        lock(&self.inner).view.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.inner).generation
    }

    /// Start fetching `filters`, superseding any fetch in flight.
    pub fn refresh(&self, filters: FilterState) -> JoinHandle<FetchOutcome> {
        let token = CancellationToken::new();
        let generation = {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            if let Some(previous) = inner.in_flight.replace(token.clone()) {
                previous.cancel();
            }
            inner.view = ListingView::Loading {
                filters: filters.clone(),
            };
            inner.generation
        };

        tracing::debug!(generation, query = %filters.serialize(), "Listing refresh");

        let source = Arc::clone(&self.source);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return FetchOutcome::Cancelled,
                result = source.fetch(&filters) => result,
            };

            let mut inner = lock(&inner);
            if inner.generation != generation {
                return FetchOutcome::Superseded;
            }
            inner.in_flight = None;
            inner.view = match result {
                Ok(page) => ListingView::Ready { filters, page },
                Err(e) => {
                    tracing::warn!(error = %e, "Listing fetch failed");
                    ListingView::Failed {
                        filters,
                        message: e.to_string(),
                    }
                }
            };
            FetchOutcome::Applied
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Serves pages whose `total` encodes the page number; searches for
    /// "slow" take a while, "broken" fails.
    struct ScriptedSource;

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn fetch(&self, filters: &FilterState) -> anyhow::Result<Page<Meeting>> {
            match filters.search.as_str() {
                "slow" => tokio::time::sleep(Duration::from_millis(300)).await,
                "broken" => anyhow::bail!("Error loading meetings"),
                _ => {}
            }
            Ok(Page::new(Vec::new(), u64::from(filters.page()), 10))
        }
    }

    #[tokio::test]
    async fn test_single_refresh_applies() {
        let listing = ListingController::new(ScriptedSource);
        assert_eq!(listing.view(), ListingView::Idle);

        let filters = FilterState::default().with_page(4);
        let outcome = listing.refresh(filters.clone()).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied);
        match listing.view() {
            ListingView::Ready { filters: shown, page } => {
                assert_eq!(shown, filters);
                assert_eq!(page.total, 4);
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_latest_filter_wins_over_slow_earlier_fetch() {
        let listing = ListingController::new(ScriptedSource);

        let stale = listing.refresh(FilterState::default().with_search("slow"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let latest = FilterState::default().with_search("fast").with_page(2);
        let fresh = listing.refresh(latest.clone());

        assert_eq!(fresh.await.unwrap(), FetchOutcome::Applied);
        assert_eq!(stale.await.unwrap(), FetchOutcome::Cancelled);
        assert_eq!(listing.view().filters(), Some(&latest));
        assert_eq!(listing.generation(), 2);
    }

    #[tokio::test]
    async fn test_view_shows_loading_for_latest_until_done() {
        let listing = ListingController::new(ScriptedSource);
        let filters = FilterState::default().with_search("slow");
        let handle = listing.refresh(filters.clone());
        assert_eq!(listing.view(), ListingView::Loading { filters });
        handle.await.unwrap();
        assert!(matches!(listing.view(), ListingView::Ready { .. }));
    }

    #[tokio::test]
    async fn test_failure_is_displayed() {
        let listing = ListingController::new(ScriptedSource);
        listing
            .refresh(FilterState::default().with_search("broken"))
            .await
            .unwrap();
        match listing.view() {
            ListingView::Failed { message, .. } => assert_eq!(message, "Error loading meetings"),
            other => panic!("unexpected view {:?}", other),
        }
    }

    /// Blocks its worker thread on a "held" search until released, so the
    /// fetch cannot observe cancellation.
    struct BlockingSource {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    #[async_trait]
    impl ListingSource for BlockingSource {
        async fn fetch(&self, filters: &FilterState) -> anyhow::Result<Page<Meeting>> {
            if filters.search == "held" {
                lock_channel(&self.entered).send(())?;
                lock_channel(&self.release).recv()?;
            }
            Ok(Page::new(Vec::new(), u64::from(filters.page()), 10))
        }
    }

    fn lock_channel<T>(channel: &Mutex<T>) -> MutexGuard<'_, T> {
        channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_finished_stale_fetch_is_discarded() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let listing = ListingController::new(BlockingSource {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });

        let stale = listing.refresh(FilterState::default().with_search("held"));
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("held fetch started");

        let latest = FilterState::default().with_search("fast").with_page(3);
        let fresh = listing.refresh(latest.clone());
        assert_eq!(fresh.await.unwrap(), FetchOutcome::Applied);

        release_tx.send(()).unwrap();
        assert_eq!(stale.await.unwrap(), FetchOutcome::Superseded);
        match listing.view() {
            ListingView::Ready { filters, page } => {
                assert_eq!(filters, latest);
                assert_eq!(page.total, 3);
            }
            other => panic!("unexpected view {:?}", other),
        }
    }
}
