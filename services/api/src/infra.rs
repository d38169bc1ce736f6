use metrics_exporter_prometheus::PrometheusHandle;
use portal::auth::StaticTokenAuth;
use portal::blob::InMemoryBlobStore;
use portal::config::PortalConfig;
use portal::feed::ChangeFeed;
use portal::listings::ListingService;
use portal::requests::{
    ContactService, ExchangeRateService, RequestServices, ShippingService, TransferService,
};
use portal::store::InMemoryEntityStore;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type Store = InMemoryEntityStore;
pub(crate) type Listings = ListingService<Store, StaticTokenAuth>;
pub(crate) type Requests = RequestServices<Store, StaticTokenAuth, InMemoryBlobStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) requests: Arc<Requests>,
}

/// Process-local wiring of every collaborator the portal core consumes.
pub(crate) struct Portal {
    pub(crate) feed: ChangeFeed,
    pub(crate) store: Arc<Store>,
    pub(crate) blobs: Arc<InMemoryBlobStore>,
    pub(crate) listings: Arc<Listings>,
    pub(crate) requests: Arc<Requests>,
}

impl Portal {
    pub(crate) fn in_memory(config: &PortalConfig) -> Self {
        let feed = ChangeFeed::new(config.feed_capacity);
        let store = Arc::new(InMemoryEntityStore::new(feed.clone()));
        let auth = Arc::new(StaticTokenAuth::from_admin_tokens(&config.admin_tokens));
        let blobs = Arc::new(InMemoryBlobStore::default());

        let listings = Arc::new(ListingService::new(
            Arc::clone(&store),
            Arc::clone(&auth),
            config.recent_limit,
        ));
        let requests = Arc::new(RequestServices {
            shipping: ShippingService::new(Arc::clone(&store), Arc::clone(&auth)),
            rates: ExchangeRateService::new(Arc::clone(&store), Arc::clone(&auth)),
            transfers: TransferService::new(Arc::clone(&store), Arc::clone(&blobs), config),
            contact: ContactService::new(Arc::clone(&store)),
        });

        Self {
            feed,
            store,
            blobs,
            listings,
            requests,
        }
    }
}
