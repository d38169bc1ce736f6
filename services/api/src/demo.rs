use crate::infra::{Portal, Store};
use clap::Args;
use portal::auth::SessionContext;
use portal::config::PortalConfig;
use portal::error::{AppError, PortalError};
use portal::listings::{
    Decision, Listing, ListingDetails, ListingKind, ListingStatus, ListingSubmission,
    ModerationError,
};
use portal::pricing::{round_to_cents, WeightUnit};
use portal::requests::{AttachmentKind, RecipientInfo, SenderInfo, TransferSubmission};
use portal::sync::{ListingSlice, ViewSynchronizer};
use std::sync::Arc;

const FIRST_ADMIN: (&str, &str) = ("demo-admin-ana", "admin-ana");
const SECOND_ADMIN: (&str, &str) = ("demo-admin-ben", "admin-ben");
const DEMO_RECEIPT: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the shipping and money-transfer portion of the demo.
    #[arg(long)]
    pub(crate) skip_requests: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = PortalConfig::default();
    for (token, principal) in [FIRST_ADMIN, SECOND_ADMIN] {
        config
            .admin_tokens
            .insert(token.to_string(), principal.to_string());
    }
    let portal = Portal::in_memory(&config);
    let ana = SessionContext::bearer(FIRST_ADMIN.0);
    let ben = SessionContext::bearer(SECOND_ADMIN.0);

    println!("Community portal demo");
    println!("=====================");

    let mut queue = mount(
        &portal,
        ListingSlice::admin_tab(ListingKind::Job, ListingStatus::Pending),
    )
    .await?;
    let public = mount(&portal, ListingSlice::published(ListingKind::Job)).await?;

    let visitor = SessionContext::anonymous();
    let mut submitted = Vec::new();
    for (title, company) in [
        ("Barista, weekend shifts", "Harbor Cafe"),
        ("Delivery driver", "Quick Parcel"),
        ("Bookkeeper", "Palm Street Co-op"),
    ] {
        let listing = portal
            .listings
            .submit_listing(&visitor, job(title, company))
            .await?;
        submitted.push(listing);
    }
    refresh(&queue).await?;
    refresh(&public).await?;
    render("Moderation queue after three submissions", &queue.snapshot().items);
    render("Public job board", &public.snapshot().items);

    let contested = submitted[0].id.clone();
    let (by_ana, by_ben) = tokio::join!(
        portal
            .listings
            .decide(&ana, ListingKind::Job, &contested, Decision::Approve),
        portal
            .listings
            .decide(&ben, ListingKind::Job, &contested, Decision::Reject),
    );
    println!();
    println!("Two admins decide {contested} at the same time:");
    report_decision("admin-ana approves", by_ana)?;
    report_decision("admin-ben rejects", by_ben)?;

    portal
        .listings
        .decide(&ana, ListingKind::Job, &submitted[1].id, Decision::Approve)
        .await
        .map_err(PortalError::from)?;
    portal
        .listings
        .decide(&ben, ListingKind::Job, &submitted[2].id, Decision::Reject)
        .await
        .map_err(PortalError::from)?;

    refresh(&queue).await?;
    refresh(&public).await?;
    render("Moderation queue after decisions", &queue.snapshot().items);
    render("Public job board", &public.snapshot().items);

    queue
        .switch_status(ListingStatus::Rejected)
        .await
        .map_err(PortalError::from)?;
    render("Rejected tab", &queue.snapshot().items);

    let queue_topic = ListingSlice::admin_tab(ListingKind::Job, ListingStatus::Rejected).topic();
    let public_topic = ListingSlice::published(ListingKind::Job).topic();
    queue.unmount().await;
    public.unmount().await;
    println!();
    println!(
        "Views unmounted; open subscriptions: rejected tab {}, public board {}",
        portal.feed.subscriber_count(&queue_topic),
        portal.feed.subscriber_count(&public_topic)
    );

    if !args.skip_requests {
        run_request_demo(&portal, &ana).await?;
    }

    Ok(())
}

async fn mount(portal: &Portal, slice: ListingSlice) -> Result<ViewSynchronizer<Store>, AppError> {
    let view = ViewSynchronizer::mount(Arc::clone(&portal.store), &portal.feed, slice)
        .await
        .map_err(PortalError::from)?;
    Ok(view)
}

/// The listener refetches on its own; the demo forces one more read so the printout is settled.
async fn refresh(view: &ViewSynchronizer<Store>) -> Result<(), AppError> {
    view.refetch().await.map_err(PortalError::from)?;
    Ok(())
}

fn job(title: &str, company: &str) -> ListingSubmission {
    ListingSubmission {
        title: title.to_string(),
        description: String::new(),
        contact: "hiring@example.org".to_string(),
        details: ListingDetails::Job {
            company: company.to_string(),
            location: "Downtown".to_string(),
        },
    }
}

fn render(heading: &str, listings: &[Listing]) {
    println!();
    println!("{heading}:");
    if listings.is_empty() {
        println!("  (none)");
    }
    for listing in listings {
        let approver = listing
            .approved_by
            .as_ref()
            .map(|id| format!(", approved by {id}"))
            .unwrap_or_default();
        println!(
            "  - [{}] {} ({}{approver})",
            listing.id,
            listing.title,
            listing.status.label()
        );
    }
}

fn report_decision(
    label: &str,
    outcome: Result<Listing, ModerationError>,
) -> Result<(), AppError> {
    match outcome {
        Ok(listing) => println!("  {label}: won, listing is now {}", listing.status.label()),
        Err(err @ ModerationError::AlreadyDecided { .. }) => {
            println!("  {label}: conflict ({err}); refresh and move on")
        }
        Err(other) => return Err(PortalError::from(other).into()),
    }
    Ok(())
}

async fn run_request_demo(portal: &Portal, admin: &SessionContext) -> Result<(), AppError> {
    println!();
    println!("Shipping and money transfers");
    println!("----------------------------");
    for (weight, unit) in [(2.0, WeightUnit::Kg), (8.0, WeightUnit::Kg), (20.0, WeightUnit::Lbs)] {
        let quote = portal::pricing::quote(weight, unit);
        println!(
            "  {weight} {}: {} tier, ${:.2}",
            unit.label(),
            quote.tier.label(),
            quote.cost
        );
    }

    portal.requests.rates.publish(admin, 56.5).await?;
    let proof = portal
        .requests
        .transfers
        .upload_attachment(AttachmentKind::PaymentProof, DEMO_RECEIPT.to_vec(), "image/png")
        .await?;
    let transfer = portal
        .requests
        .transfers
        .submit(TransferSubmission {
            sender: SenderInfo {
                name: "Ana Reyes".to_string(),
                phone: "+1 555 010 2000".to_string(),
                email: None,
            },
            recipient: RecipientInfo {
                name: "Luis Reyes".to_string(),
                phone: "0917 555 0101".to_string(),
                bank_name: "Metro Bank".to_string(),
                account_number: "001-234-567".to_string(),
            },
            usd_amount: 100.0,
            proof_path: Some(proof),
            signature_path: None,
        })
        .await?;

    portal.requests.rates.publish(admin, 57.25).await?;
    let stored = portal.requests.transfers.get(&transfer.reference_number).await?;
    println!(
        "  Transfer {}: USD {:.2} at {} = {:.2} (rate frozen even after a newer rate was published)",
        stored.reference_number,
        stored.usd_amount,
        stored.rate_snapshot,
        round_to_cents(stored.local_amount)
    );
    println!(
        "  Payment proof stored at {} ({} object(s) in the blob store)",
        stored.proof_path.as_deref().unwrap_or("-"),
        portal.blobs.len()
    );
    Ok(())
}
