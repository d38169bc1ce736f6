//! Money-transfer, shipping and contact forms driven through their services against the
//! in-memory store.

mod common {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use portal::auth::{Principal, StaticTokenAuth};
    use portal::blob::InMemoryBlobStore;
    use portal::config::PortalConfig;
    use portal::feed::ChangeFeed;
    use portal::pricing::WeightUnit;
    use portal::requests::{
        ContactService, ExchangeRateService, RecipientInfo, RequestServices, SenderInfo,
        ShippingParty, ShippingService, ShippingSubmission, TransferService, TransferSubmission,
    };
    use portal::store::InMemoryEntityStore;

    pub(super) type Services = RequestServices<InMemoryEntityStore, StaticTokenAuth, InMemoryBlobStore>;

    pub(super) fn services() -> (Services, InMemoryBlobStore, ChangeFeed) {
        let feed = ChangeFeed::default();
        let store = Arc::new(InMemoryEntityStore::new(feed.clone()));
        let auth = Arc::new(
            StaticTokenAuth::default().with_principal("token-admin", Principal::admin("admin-1")),
        );
        let blobs = InMemoryBlobStore::default();
        let config = PortalConfig {
            max_upload_bytes: 16,
            ..PortalConfig::default()
        };
        let services = RequestServices {
            shipping: ShippingService::new(Arc::clone(&store), Arc::clone(&auth)),
            rates: ExchangeRateService::new(Arc::clone(&store), auth),
            transfers: TransferService::new(Arc::clone(&store), Arc::new(blobs.clone()), &config),
            contact: ContactService::new(store),
        };
        (services, blobs, feed)
    }

    pub(super) fn transfer(usd_amount: f64, proof_path: Option<String>) -> TransferSubmission {
        TransferSubmission {
            sender: SenderInfo {
                name: "Ana Reyes".to_string(),
                phone: "+1 555 010 2000".to_string(),
                email: Some("ana@example.org".to_string()),
            },
            recipient: RecipientInfo {
                name: "Luis Reyes".to_string(),
                phone: "0917 555 0101".to_string(),
                bank_name: "Metro Bank".to_string(),
                account_number: "001-234-567".to_string(),
            },
            usd_amount,
            proof_path,
            signature_path: None,
        }
    }

    fn party(name: &str) -> ShippingParty {
        ShippingParty {
            name: name.to_string(),
            phone: "555-010-3000".to_string(),
            address: "7 Harbor Road".to_string(),
        }
    }

    pub(super) fn parcel(weight: f64, unit: WeightUnit) -> ShippingSubmission {
        ShippingSubmission {
            sender: party("Ana"),
            receiver: party("Luis"),
            weight,
            unit,
            shipping_date: (Utc::now() + Duration::days(3)).date_naive(),
            notes: String::new(),
        }
    }
}

use common::*;
use portal::auth::SessionContext;
use portal::error::PortalError;
use portal::feed::Topic;
use portal::pricing::{convert_usd_to_local, WeightUnit};
use portal::requests::{AttachmentKind, ContactSubmission, ExchangeRateImporter, ShippingStatus};
use portal::store::Table;

#[tokio::test]
async fn transfer_freezes_the_rate_it_was_converted_with() {
    let (services, _, _) = services();
    let admin = SessionContext::bearer("token-admin");

    let missing = services
        .transfers
        .submit(transfer(100.0, None))
        .await
        .expect_err("no rate yet");
    assert!(matches!(missing, PortalError::NotFound { entity: "exchange rate", .. }));

    services.rates.publish(&admin, 56.5).await.unwrap();
    let created = services.transfers.submit(transfer(100.0, None)).await.unwrap();
    assert_eq!(created.rate_snapshot, 56.5);
    assert_eq!(created.local_amount, convert_usd_to_local(100.0, 56.5));
    assert_eq!(created.local_amount, 5650.0);
    assert!(created.reference_number.starts_with("TRF-"));

    services.rates.publish(&admin, 58.0).await.unwrap();
    assert_eq!(services.rates.current().await.unwrap().rate, 58.0);

    let stored = services
        .transfers
        .get(&created.reference_number)
        .await
        .unwrap();
    assert_eq!(stored.rate_snapshot, 56.5);
    assert_eq!(stored.local_amount, 5650.0);

    let history = services.rates.history(None).await.unwrap();
    let rates: Vec<f64> = history.iter().map(|row| row.rate).collect();
    assert_eq!(rates, vec![58.0, 56.5]);
}

#[tokio::test]
async fn publishing_rates_is_admin_only() {
    let (services, _, _) = services();
    let err = services
        .rates
        .publish(&SessionContext::anonymous(), 56.5)
        .await
        .expect_err("anonymous");
    assert_eq!(err.kind(), "auth");

    let err = services
        .rates
        .publish(&SessionContext::bearer("token-admin"), 0.0)
        .await
        .expect_err("rate must be positive");
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn payment_proof_is_stored_by_path() {
    let (services, blobs, _) = services();
    services
        .rates
        .publish(&SessionContext::bearer("token-admin"), 56.5)
        .await
        .unwrap();

    let path = services
        .transfers
        .upload_attachment(AttachmentKind::PaymentProof, vec![0xff, 0xd8, 0xff], "image/jpeg")
        .await
        .expect("uploaded");
    assert!(path.ends_with(".jpg"));
    assert_eq!(
        blobs.get("payment-proofs", &path).map(|blob| blob.bytes),
        Some(vec![0xff, 0xd8, 0xff])
    );

    let created = services
        .transfers
        .submit(transfer(25.0, Some(path.clone())))
        .await
        .unwrap();
    assert_eq!(created.proof_path.as_deref(), Some(path.as_str()));

    let too_big = services
        .transfers
        .upload_attachment(AttachmentKind::Signature, vec![0; 17], "image/png")
        .await
        .expect_err("over the limit");
    assert_eq!(too_big.kind(), "validation");
    assert_eq!(blobs.len(), 1);
}

#[tokio::test]
async fn shipping_requests_freeze_cost_and_advance_in_order() {
    let (services, _, feed) = services();
    let admin = SessionContext::bearer("token-admin");
    let mut table = feed.subscribe(Topic::table(Table::ShippingRequests));

    let created = services
        .shipping
        .submit(parcel(20.0, WeightUnit::Lbs))
        .await
        .unwrap();
    assert_eq!(created.cost, 163.2);
    assert_eq!(created.status, ShippingStatus::Pending);
    assert!(table.next_signal().await.is_some());

    let err = services
        .shipping
        .advance(&admin, created.id, ShippingStatus::Completed)
        .await
        .expect_err("cannot skip in_progress");
    assert_eq!(err.kind(), "conflict");

    let moved = services
        .shipping
        .advance(&admin, created.id, ShippingStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(moved.status, ShippingStatus::InProgress);
    assert_eq!(moved.cost, 163.2);

    let in_progress = services
        .shipping
        .list(&admin, Some(ShippingStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);

    let err = services
        .shipping
        .list(&SessionContext::anonymous(), None)
        .await
        .expect_err("admin only");
    assert_eq!(err.kind(), "auth");
}

#[tokio::test]
async fn imported_rates_become_the_log() {
    let (services, _, _) = services();
    let csv = "rate,created_at\n55.10,2025-01-02\n55.80,2025-03-01T08:00:00Z\n55.40,2025-02-01\n";
    let rows = ExchangeRateImporter::from_reader(csv.as_bytes()).expect("valid csv");

    let stored = services
        .rates
        .import(&SessionContext::bearer("token-admin"), rows)
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(services.rates.current().await.unwrap().rate, 55.80);
}

#[tokio::test]
async fn contact_messages_are_trimmed_and_stored() {
    let (services, _, _) = services();
    let stored = services
        .contact
        .submit(ContactSubmission {
            name: "  Ana ".to_string(),
            email: "ana@example.org".to_string(),
            subject: String::new(),
            message: " Do you ship to Cebu? ".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(stored.name, "Ana");
    assert_eq!(stored.message, "Do you ship to Cebu?");
}
