use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::*;
use crate::auth::{Principal, PrincipalId};
use crate::feed::ChangeFeed;
use crate::listings::domain::{ListingDetails, ListingDraft, ListingId, ListingSubmission};
use crate::listings::moderation::{Decision, DecisionUpdate};
use crate::store::{InMemoryEntityStore, ListingStore};

/// Held fetch: `read` fires once the store has taken its snapshot, `release` lets it return.
struct Gate {
    read: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

struct PendingGate {
    read: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Wraps the in-memory store so a test can hold a fetch after it has read its rows.
struct GatedStore {
    inner: InMemoryEntityStore,
    gates: Mutex<VecDeque<PendingGate>>,
    fail_next: AtomicBool,
}

impl GatedStore {
    fn new(feed: ChangeFeed) -> Self {
        Self {
            inner: InMemoryEntityStore::new(feed),
            gates: Mutex::new(VecDeque::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    fn hold_next(&self) -> Gate {
        let (read_tx, read_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(PendingGate {
            read: read_tx,
            release: release_rx,
        });
        Gate {
            read: read_rx,
            release: release_tx,
        }
    }

    async fn approved_job(&self, title: &str) -> Listing {
        let pending = self
            .inner
            .insert_listing(job_draft(title))
            .await
            .expect("insert");
        self.inner
            .decide_listing(
                ListingKind::Job,
                &pending.id,
                ListingStatus::Pending,
                DecisionUpdate::for_decision(Decision::Approve, &Principal::admin("admin-1")),
            )
            .await
            .expect("approve")
    }
}

#[async_trait]
impl ListingStore for GatedStore {
    async fn insert_listing(&self, draft: ListingDraft) -> Result<Listing, StoreError> {
        self.inner.insert_listing(draft).await
    }

    async fn query_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        let rows = self.inner.query_listings(query).await;
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.read.send(());
            let _ = gate.release.await;
        }
        rows
    }

    async fn fetch_listing(
        &self,
        kind: ListingKind,
        id: &ListingId,
    ) -> Result<Option<Listing>, StoreError> {
        self.inner.fetch_listing(kind, id).await
    }

    async fn decide_listing(
        &self,
        kind: ListingKind,
        id: &ListingId,
        expected: ListingStatus,
        update: DecisionUpdate,
    ) -> Result<Listing, StoreError> {
        self.inner.decide_listing(kind, id, expected, update).await
    }
}

fn job_draft(title: &str) -> ListingDraft {
    ListingSubmission {
        title: title.to_string(),
        description: String::new(),
        contact: "555-0101".to_string(),
        details: ListingDetails::Job {
            company: "Harbor Cafe".to_string(),
            location: "Downtown".to_string(),
        },
    }
    .into_draft(Some(PrincipalId("member-1".to_string())))
    .expect("valid job")
}

fn titles(snapshot: &ViewSnapshot) -> Vec<String> {
    snapshot.items.iter().map(|l| l.title.clone()).collect()
}

#[tokio::test]
async fn mount_loads_the_slice() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    store.approved_job("Barista").await;
    store.inner.insert_listing(job_draft("Cook")).await.unwrap();

    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &feed,
        ListingSlice::published(ListingKind::Job),
    )
    .await
    .expect("mount");

    let snapshot = view.snapshot();
    assert_eq!(titles(&snapshot), vec!["Barista"]);
    assert!(!snapshot.is_loading);
    assert_eq!(
        feed.subscriber_count(&ListingSlice::published(ListingKind::Job).topic()),
        1
    );
}

#[tokio::test]
async fn notification_replaces_cache_wholesale() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    store.approved_job("Barista").await;
    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &feed,
        ListingSlice::published(ListingKind::Job),
    )
    .await
    .unwrap();

    let mut updates = view.handle().updates();
    store.approved_job("Driver").await;
    updates.changed().await.expect("view refetched");

    let expected = store
        .inner
        .query_listings(&ListingSlice::published(ListingKind::Job).query())
        .await
        .unwrap();
    assert_eq!(view.snapshot().items, expected);
    assert_eq!(titles(&view.snapshot()), vec!["Driver", "Barista"]);
}

#[tokio::test]
async fn stale_fetch_never_overwrites_newer_result() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    store.approved_job("Barista").await;
    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &feed,
        ListingSlice::published(ListingKind::Job),
    )
    .await
    .unwrap();

    let gate = store.hold_next();
    let handle = view.handle();
    let stale = tokio::spawn(async move { handle.refetch().await });
    gate.read.await.expect("stale fetch read its rows");
    assert!(view.snapshot().is_loading);

    let mut updates = view.handle().updates();
    store.approved_job("Driver").await;
    updates.changed().await.expect("listener refetched");
    assert_eq!(titles(&view.snapshot()), vec!["Driver", "Barista"]);

    gate.release.send(()).unwrap();
    let outcome = stale.await.unwrap().expect("fetch completes");
    assert_eq!(outcome, FetchOutcome::Superseded);
    assert_eq!(titles(&view.snapshot()), vec!["Driver", "Barista"]);
    assert!(!view.snapshot().is_loading);
}

#[tokio::test]
async fn fetch_resolving_after_unmount_has_no_effect() {
    let view_feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(ChangeFeed::default()));
    let slice = ListingSlice::published(ListingKind::Job);
    let view = ViewSynchronizer::mount(Arc::clone(&store), &view_feed, slice)
        .await
        .unwrap();
    assert!(view.snapshot().items.is_empty());

    store.approved_job("Barista").await;
    let gate = store.hold_next();
    let handle = view.handle();
    let in_flight = tokio::spawn({
        let handle = handle.clone();
        async move { handle.refetch().await }
    });
    gate.read.await.unwrap();

    view.unmount().await;
    assert_eq!(view_feed.subscriber_count(&slice.topic()), 0);

    gate.release.send(()).unwrap();
    assert_eq!(in_flight.await.unwrap().unwrap(), FetchOutcome::Discarded);
    assert!(handle.snapshot().items.is_empty());
    assert!(!handle.snapshot().is_loading);
    assert!(!handle.is_mounted());
    assert!(matches!(handle.refetch().await, Err(SyncError::Unmounted)));
}

#[tokio::test]
async fn dropping_the_view_unmounts_it() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &feed,
        ListingSlice::published(ListingKind::Job),
    )
    .await
    .unwrap();
    let handle = view.handle();

    drop(view);

    assert!(!handle.is_mounted());
    assert!(matches!(handle.refetch().await, Err(SyncError::Unmounted)));
}

#[tokio::test]
async fn reconnect_triggers_full_refetch() {
    let view_feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(ChangeFeed::default()));
    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &view_feed,
        ListingSlice::published(ListingKind::Job),
    )
    .await
    .unwrap();

    // Written while the view's transport was down: no notification reaches it.
    store.approved_job("Barista").await;
    assert!(view.snapshot().items.is_empty());

    let mut updates = view.handle().updates();
    view_feed.announce_reconnect();
    updates.changed().await.unwrap();
    assert_eq!(titles(&view.snapshot()), vec!["Barista"]);
}

#[tokio::test]
async fn failed_refetch_keeps_last_items() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    store.approved_job("Barista").await;
    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &feed,
        ListingSlice::published(ListingKind::Job),
    )
    .await
    .unwrap();

    store.fail_next.store(true, Ordering::SeqCst);
    let err = view.refetch().await.expect_err("store unavailable");
    assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));
    assert_eq!(titles(&view.snapshot()), vec!["Barista"]);
    assert!(!view.snapshot().is_loading);
}

#[tokio::test]
async fn switching_tabs_moves_the_subscription() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    store.approved_job("Barista").await;
    store.inner.insert_listing(job_draft("Cook")).await.unwrap();

    let pending = ListingSlice::admin_tab(ListingKind::Job, ListingStatus::Pending);
    let approved = ListingSlice::admin_tab(ListingKind::Job, ListingStatus::Approved);
    let mut view = ViewSynchronizer::mount(Arc::clone(&store), &feed, pending)
        .await
        .unwrap();
    assert_eq!(titles(&view.snapshot()), vec!["Cook"]);

    let outcome = view
        .switch_status(ListingStatus::Approved)
        .await
        .expect("switch");
    assert_eq!(outcome, FetchOutcome::Applied);
    assert_eq!(titles(&view.snapshot()), vec!["Barista"]);
    assert_eq!(feed.subscriber_count(&pending.topic()), 0);
    assert_eq!(feed.subscriber_count(&approved.topic()), 1);
}

#[tokio::test]
async fn recent_widget_is_capped() {
    let feed = ChangeFeed::default();
    let store = Arc::new(GatedStore::new(feed.clone()));
    for title in ["One", "Two", "Three", "Four"] {
        store.approved_job(title).await;
    }

    let view = ViewSynchronizer::mount(
        Arc::clone(&store),
        &feed,
        ListingSlice::recent(ListingKind::Job, 3),
    )
    .await
    .unwrap();

    assert_eq!(titles(&view.snapshot()), vec!["Four", "Three", "Two"]);
}
