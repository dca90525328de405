//! Walks one quote through a cascade, an upstream edit and a resync.
//!
//! Run with `RUST_LOG=doc_lineage=debug` to watch the stages. The database
//! lives in a temporary directory unless `LINEAGE_DB_PATH` is set.

use anyhow::Context;
use doc_lineage::{
    config::LineageConfig,
    document::{Document, DocumentKind, LineItem},
    reconcile::SyncReconciler,
    service::{CascadeOutcome, LineageService},
    sled_store::SledStore,
};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LineageConfig::from_env()?;
    let temp_dir = tempfile::tempdir()?;
    let db_path = if std::env::var_os("LINEAGE_DB_PATH").is_some() {
        config.db_path.clone()
    } else {
        temp_dir.path().join("lineage.db")
    };
    let store = SledStore::open(&db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let service = LineageService::new(store.clone(), config.clone());
    let reconciler = SyncReconciler::new(store, config.fingerprint_order);

    let quote = service.create_quote(
        Document::new(DocumentKind::Quote)
            .set_client("client_acme")
            .set_discount_percent(5.0)
            .push_item(
                LineItem::new("Standing desk")
                    .set_unit("pc")
                    .set_quantity(2.0)
                    .set_unit_price(450.0),
            )
            .push_item(
                LineItem::new("Installation")
                    .set_unit("h")
                    .set_quantity(3.0)
                    .set_unit_price(60.0),
            ),
    )?;
    println!("quote {} created", quote.number);

    match service.cascade(&quote.id)? {
        CascadeOutcome::Generated(report) => {
            for stage in &report.stages {
                println!("{:?}", stage);
            }
        }
        CascadeOutcome::AlreadyProcessed(chain) => println!("already processed: {chain:?}"),
    }

    // the customer wants a third desk
    let mut items = quote.items.clone();
    if let Some(desk) = items.first_mut() {
        desk.quantity = Some(3.0);
    }
    service.edit_items(&quote.reference(), items)?;

    let chain = service.lineage(&quote.id)?;
    for doc in [chain.purchase_order, chain.delivery_note, chain.invoice]
        .into_iter()
        .flatten()
    {
        let preview = reconciler.preview(&doc)?;
        println!(
            "{doc}: {:?}, {} added, {} removed, {} changed",
            preview.state,
            preview.diff.added.len(),
            preview.diff.removed.len(),
            preview.diff.changed.len()
        );
        let outcome = reconciler.apply(&preview.diff, &doc)?;
        println!("{doc}: {outcome:?}");
    }

    let invoice = chain_invoice(&service, &quote.id)?;
    if let Some(totals) = invoice.totals {
        println!(
            "invoice {} totals: net {} vat {} ttc {}",
            invoice.number, totals.net_ht, totals.vat, totals.ttc
        );
    }

    Ok(())
}

fn chain_invoice(service: &LineageService<SledStore>, quote_id: &str) -> anyhow::Result<Document> {
    let chain = service.lineage(quote_id)?;
    let invoice = chain.invoice.context("no invoice derived")?;
    Ok(service.load(&invoice)?)
}
