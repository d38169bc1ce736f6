use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ListingSlice, SyncError, ViewSnapshot};
use crate::feed::{ChangeFeed, ChangeSignal, Subscription};
use crate::listings::domain::{Listing, ListingStatus};
use crate::store::ListingStore;

/// What happened to the result of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The cache now holds this fetch's rows.
    Applied,
    /// A fetch issued later had already been applied; this result was dropped.
    Superseded,
    /// The view unmounted while the fetch was in flight; nothing was written.
    Discarded,
}

#[derive(Debug)]
struct ViewState {
    slice: ListingSlice,
    items: Vec<Listing>,
    /// Last ticket handed out.
    issued: u64,
    /// Ticket whose rows `items` currently holds.
    applied: u64,
    in_flight: usize,
    mounted: bool,
}

struct Shared<S> {
    store: Arc<S>,
    state: Mutex<ViewState>,
    version: watch::Sender<u64>,
}

impl<S> Shared<S> {
    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the in-flight count even when the fetching task is aborted mid-await.
struct InFlight<'a, S> {
    shared: &'a Shared<S>,
}

impl<S> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Cloneable access to a mounted view: read its snapshot or ask it to refetch.
pub struct ViewHandle<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for ViewHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> ViewHandle<S>
where
    S: ListingStore + 'static,
{
    fn new(store: Arc<S>, slice: ListingSlice) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                store,
                state: Mutex::new(ViewState {
                    slice,
                    items: Vec::new(),
                    issued: 0,
                    applied: 0,
                    in_flight: 0,
                    mounted: true,
                }),
                version,
            }),
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let state = self.shared.state();
        ViewSnapshot {
            items: state.items.clone(),
            is_loading: state.mounted && state.in_flight > 0,
        }
    }

    pub fn slice(&self) -> ListingSlice {
        self.shared.state().slice
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.state().mounted
    }

    /// Receiver bumped with the applied ticket every time the cache is replaced.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }

    /// Re-read the whole slice and replace the cache with it.
    ///
    /// Results are applied in completion order, except that a fetch resolving after a
    /// later-issued fetch has been applied is dropped, so an older read can never overwrite a
    /// newer one.
    pub async fn refetch(&self) -> Result<FetchOutcome, SyncError> {
        let (ticket, query) = {
            let mut state = self.shared.state();
            if !state.mounted {
                return Err(SyncError::Unmounted);
            }
            state.issued += 1;
            state.in_flight += 1;
            (state.issued, state.slice.query())
        };
        let in_flight = InFlight {
            shared: &self.shared,
        };

        let result = self.shared.store.query_listings(&query).await;
        drop(in_flight);

        let mut state = self.shared.state();
        if !state.mounted {
            return Ok(FetchOutcome::Discarded);
        }
        let rows = result?;
        if ticket <= state.applied {
            debug!(ticket, applied = state.applied, "stale fetch dropped");
            return Ok(FetchOutcome::Superseded);
        }

        state.items = rows;
        state.applied = ticket;
        drop(state);
        self.shared.version.send_replace(ticket);
        Ok(FetchOutcome::Applied)
    }

    fn unmount(&self) {
        let mut state = self.shared.state();
        state.mounted = false;
    }

    /// Point the view at another status; fetches issued for the old status are invalidated.
    fn retarget(&self, status: ListingStatus) {
        let mut state = self.shared.state();
        state.slice.status = status;
        state.items.clear();
        state.applied = state.issued;
    }
}

/// Owner of a mounted view: its subscription lives exactly as long as this value.
pub struct ViewSynchronizer<S>
where
    S: ListingStore + 'static,
{
    handle: ViewHandle<S>,
    feed: ChangeFeed,
    listener: Option<JoinHandle<()>>,
}

impl<S> ViewSynchronizer<S>
where
    S: ListingStore + 'static,
{
    /// Subscribe to the slice, then perform the initial fetch.
    ///
    /// The subscription is opened first so a change landing during the initial fetch still
    /// triggers a refetch.
    pub async fn mount(
        store: Arc<S>,
        feed: &ChangeFeed,
        slice: ListingSlice,
    ) -> Result<Self, SyncError> {
        let handle = ViewHandle::new(store, slice);
        let subscription = feed.subscribe(slice.topic());
        let listener = tokio::spawn(listen(handle.clone(), subscription));

        let synchronizer = Self {
            handle,
            feed: feed.clone(),
            listener: Some(listener),
        };
        synchronizer.handle.refetch().await?;
        debug!(
            kind = slice.kind.label(),
            status = slice.status.label(),
            "view mounted"
        );
        Ok(synchronizer)
    }

    pub fn handle(&self) -> ViewHandle<S> {
        self.handle.clone()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.handle.snapshot()
    }

    pub async fn refetch(&self) -> Result<FetchOutcome, SyncError> {
        self.handle.refetch().await
    }

    /// Admin tab change: swap the subscription and reload for the new status.
    pub async fn switch_status(&mut self, status: ListingStatus) -> Result<FetchOutcome, SyncError> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
        self.handle.retarget(status);

        let subscription = self.feed.subscribe(self.handle.slice().topic());
        self.listener = Some(tokio::spawn(listen(self.handle.clone(), subscription)));
        self.handle.refetch().await
    }

    /// Tear the view down. Once this returns the subscription is closed and no in-flight fetch
    /// can write into the view.
    pub async fn unmount(mut self) {
        self.handle.unmount();
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
        let slice = self.handle.slice();
        debug!(
            kind = slice.kind.label(),
            status = slice.status.label(),
            "view unmounted"
        );
    }
}

impl<S> Drop for ViewSynchronizer<S>
where
    S: ListingStore + 'static,
{
    fn drop(&mut self) {
        self.handle.unmount();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn listen<S>(handle: ViewHandle<S>, mut subscription: Subscription)
where
    S: ListingStore + 'static,
{
    while let Some(signal) = subscription.next_signal().await {
        if signal == ChangeSignal::Resync {
            debug!(topic = ?subscription.topic(), "resync requested");
        }
        match handle.refetch().await {
            Ok(_) => {}
            Err(SyncError::Unmounted) => break,
            Err(err) => warn!(error = %err, topic = ?subscription.topic(), "refetch after change failed"),
        }
    }
}
