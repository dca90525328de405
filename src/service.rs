//! Service layer API for quotes and the documents cascaded from them
//!
//! Accepting a quote derives a purchase order, a delivery note and an invoice
//! from it, either as a chain (quote → PO → DN → invoice) or fanned out as
//! siblings of the quote. Nothing spans stages transactionally: each stage is
//! committed on its own and first checks whether its output already exists,
//! so a cascade interrupted half way is resumed rather than duplicated.
use crate::config::LineageConfig;
use crate::document::{Document, DocumentKind, DocumentRef, DocumentStatus, LineItem};
use crate::error::{LineageError, StoreError};
use crate::fingerprint::fingerprint_items;
use crate::money::{self, MoneyLine, Totals};
use crate::normalize::{project, upstream_quantity};
use crate::store::{DocumentPatch, DocumentStore, Filter};
use crate::utils::{new_id, new_line_uid};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeMode {
    /// Quote → PO → DN → invoice, each stamped with its immediate upstream's hash.
    #[default]
    Chained,
    /// PO, DN and invoice all derived from the quote, totals recomputed from it.
    Fanned,
}

impl fmt::Display for CascadeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeMode::Chained => f.write_str("chained"),
            CascadeMode::Fanned => f.write_str("fanned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Created(DocumentRef),
    /// Found from an earlier run, untouched.
    Existing(DocumentRef),
    /// Found from an earlier run that died before writing its items.
    Resumed(DocumentRef),
}

impl StageResult {
    pub fn document(&self) -> &DocumentRef {
        match self {
            StageResult::Created(doc) | StageResult::Existing(doc) | StageResult::Resumed(doc) => {
                doc
            }
        }
    }
    pub fn was_created(&self) -> bool {
        matches!(self, StageResult::Created(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub quote: DocumentRef,
    pub mode: CascadeMode,
    pub stages: Vec<StageResult>,
}

impl CascadeReport {
    fn new(quote: DocumentRef, mode: CascadeMode) -> Self {
        Self {
            quote,
            mode,
            stages: vec![],
        }
    }
    pub fn stage(&self, kind: DocumentKind) -> Option<&StageResult> {
        self.stages.iter().find(|stage| stage.document().kind == kind)
    }
    pub fn created(&self) -> impl Iterator<Item = &DocumentRef> {
        self.stages
            .iter()
            .filter(|stage| stage.was_created())
            .map(StageResult::document)
    }
    fn committed(&self) -> Vec<DocumentRef> {
        self.stages.iter().map(|stage| stage.document().clone()).collect()
    }
}

/// Documents derived from one quote, in either topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageChain {
    pub quote: DocumentRef,
    /// `None` until the topology can be told apart (nothing, or only a PO, exists).
    pub mode: Option<CascadeMode>,
    pub purchase_order: Option<DocumentRef>,
    pub delivery_note: Option<DocumentRef>,
    pub invoice: Option<DocumentRef>,
}

impl LineageChain {
    pub fn is_complete(&self) -> bool {
        self.purchase_order.is_some() && self.delivery_note.is_some() && self.invoice.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// At least one stage ran, see the report for which were created.
    Generated(CascadeReport),
    /// Every document already existed, nothing was inserted.
    AlreadyProcessed(LineageChain),
}

impl CascadeOutcome {
    pub fn is_already_processed(&self) -> bool {
        matches!(self, CascadeOutcome::AlreadyProcessed(_))
    }
    pub fn report(&self) -> Option<&CascadeReport> {
        match self {
            CascadeOutcome::Generated(report) => Some(report),
            CascadeOutcome::AlreadyProcessed(_) => None,
        }
    }
}

// existing downstream documents of a quote, with their items
struct Resolved {
    purchase_order: Option<Document>,
    delivery_note: Option<Document>,
    invoice: Option<Document>,
    mode: Option<CascadeMode>,
}

impl Resolved {
    fn is_settled(&self) -> bool {
        [&self.purchase_order, &self.delivery_note, &self.invoice]
            .into_iter()
            .all(|stage| stage.as_ref().is_some_and(is_complete))
    }
    fn chain(&self, quote: &Document) -> LineageChain {
        LineageChain {
            quote: quote.reference(),
            mode: self.mode,
            purchase_order: self.purchase_order.as_ref().map(Document::reference),
            delivery_note: self.delivery_note.as_ref().map(Document::reference),
            invoice: self.invoice.as_ref().map(Document::reference),
        }
    }
}

pub struct LineageService<S> {
    store: S,
    config: LineageConfig,
}

impl<S: DocumentStore> LineageService<S> {
    pub fn new(store: S, config: LineageConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// Load a document with its items.
    pub fn load(&self, doc: &DocumentRef) -> Result<Document, LineageError> {
        self.store
            .find_by_id(doc.kind, &doc.id)?
            .ok_or_else(|| LineageError::not_found(doc))
    }

    /// Persist a new draft quote, its lines get a `line_uid` if they lack one.
    #[instrument(skip_all)]
    pub fn create_quote(&self, draft: Document) -> Result<Document, LineageError> {
        let mut quote = Document {
            kind: DocumentKind::Quote,
            status: DocumentStatus::Draft,
            source: None,
            upstream_hash_at_sync: None,
            ..draft
        };
        quote.items = with_line_uids(&quote.items);
        self.stamp(&mut quote);

        let (quote, _) = self.commit_stage(None, quote, &[])?;
        Ok(quote)
    }

    /// Replace a document's items, refreshing its own hash and totals.
    ///
    /// `upstream_hash_at_sync` is left alone, documents derived from this one
    /// read as stale until they are synced.
    #[instrument(skip(self, items))]
    pub fn edit_items(
        &self,
        doc: &DocumentRef,
        items: Vec<LineItem>,
    ) -> Result<Document, LineageError> {
        let mut document = self.load(doc)?;
        document.items = with_line_uids(&items);
        self.stamp(&mut document);
        self.write_items(&document)?;

        info!(count = document.items.len(), "items replaced");
        Ok(document)
    }

    /// Re-derive the cached totals of a document from its items.
    pub fn refresh_totals(&self, doc: &DocumentRef) -> Result<Totals, LineageError> {
        let document = self.load(doc)?;
        let totals = money::compute_items(doc.kind, &document.items, document.discount_percent);
        self.store.update_where(
            doc.kind,
            &Filter::by_id(&doc.id),
            &DocumentPatch {
                totals: Some(totals.clone()),
                ..DocumentPatch::default()
            },
        )?;
        Ok(totals)
    }

    /// The documents derived so far from a quote.
    pub fn lineage(&self, quote_id: &str) -> Result<LineageChain, LineageError> {
        let quote = self.load(&DocumentRef::new(DocumentKind::Quote, quote_id))?;
        Ok(self.resolve(&quote)?.chain(&quote))
    }

    /// Run whichever cascade the configuration selects.
    pub fn cascade(&self, quote_id: &str) -> Result<CascadeOutcome, LineageError> {
        match self.config.cascade_mode {
            CascadeMode::Chained => self.accept_and_cascade(quote_id),
            CascadeMode::Fanned => self.convert_quote_to_invoice(quote_id),
        }
    }

    /// Accept a quote and derive PO → DN → invoice from it as a chain.
    #[instrument(skip(self))]
    pub fn accept_and_cascade(&self, quote_id: &str) -> Result<CascadeOutcome, LineageError> {
        let quote = self.load(&DocumentRef::new(DocumentKind::Quote, quote_id))?;
        let existing = self.resolve(&quote)?;
        guard_topology(&quote, &existing, CascadeMode::Chained)?;

        if existing.is_settled() {
            self.mark_accepted(&quote)?;
            info!("lineage already generated");
            return Ok(CascadeOutcome::AlreadyProcessed(existing.chain(&quote)));
        }

        let quote = self.persist_line_uids(quote)?;
        let mut report = CascadeReport::new(quote.reference(), CascadeMode::Chained);
        let hash = self.fingerprint(&quote.items);

        let planned = self.plan_purchase_order(&quote, &hash);
        let po = self.run_stage(existing.purchase_order, planned, &mut report)?;

        let planned = self.plan_delivery_note(&po);
        let dn = self.run_stage(existing.delivery_note, planned, &mut report)?;

        let planned = self.plan_invoice(&dn, &po);
        self.run_stage(existing.invoice, planned, &mut report)?;

        self.mark_accepted(&quote)?;
        Ok(CascadeOutcome::Generated(report))
    }

    /// Accept a quote and derive PO, DN and invoice from it as siblings,
    /// recomputing line and document totals from the quote's lines.
    #[instrument(skip(self))]
    pub fn convert_quote_to_invoice(
        &self,
        quote_id: &str,
    ) -> Result<CascadeOutcome, LineageError> {
        let quote = self.load(&DocumentRef::new(DocumentKind::Quote, quote_id))?;
        let existing = self.resolve(&quote)?;
        guard_topology(&quote, &existing, CascadeMode::Fanned)?;

        if existing.is_settled() {
            self.mark_accepted(&quote)?;
            info!("lineage already generated");
            return Ok(CascadeOutcome::AlreadyProcessed(existing.chain(&quote)));
        }

        let quote = self.persist_line_uids(quote)?;
        let mut report = CascadeReport::new(quote.reference(), CascadeMode::Fanned);
        let hash = self.fingerprint(&quote.items);

        let stages = [
            (DocumentKind::PurchaseOrder, existing.purchase_order),
            (DocumentKind::DeliveryNote, existing.delivery_note),
            (DocumentKind::Invoice, existing.invoice),
        ];
        for (kind, found) in stages {
            let planned = self.plan_sibling(kind, &quote, &hash);
            self.run_stage(found, planned, &mut report)?;
        }

        self.mark_accepted(&quote)?;
        Ok(CascadeOutcome::Generated(report))
    }

    fn fingerprint(&self, items: &[LineItem]) -> String {
        fingerprint_items(items, self.config.fingerprint_order)
    }

    // own hash and totals cache, both derived from the items
    fn stamp(&self, document: &mut Document) {
        document.content_hash = Some(self.fingerprint(&document.items));
        document.totals = Some(money::compute_items(
            document.kind,
            &document.items,
            document.discount_percent,
        ));
    }

    // Replaces the stored items and refreshes the header's own hash and totals.
    fn write_items(&self, document: &Document) -> Result<(), StoreError> {
        self.store.delete_items_where(document.kind, &document.id)?;
        self.store
            .insert_many(document.kind, &document.id, &document.items)?;
        self.store.update_where(
            document.kind,
            &Filter::by_id(&document.id),
            &DocumentPatch {
                content_hash: document.content_hash.clone(),
                upstream_hash_at_sync: document.upstream_hash_at_sync.clone(),
                totals: document.totals.clone(),
                ..DocumentPatch::default()
            },
        )?;
        Ok(())
    }

    // Quote lines written by other tools can lack a uid. Any synthesized here
    // are stored on the quote before anything is derived, so resumed runs and
    // siblings all see the same identities.
    fn persist_line_uids(&self, mut quote: Document) -> Result<Document, LineageError> {
        let missing = quote
            .items
            .iter()
            .filter(|item| item.line_uid.is_none())
            .count();
        if missing == 0 {
            return Ok(quote);
        }
        quote.items = with_line_uids(&quote.items);
        self.stamp(&mut quote);
        self.write_items(&quote)?;
        warn!(quote_id = %quote.id, missing, "assigned line uids on the quote");
        Ok(quote)
    }

    fn derived(
        &self,
        source: &DocumentRef,
        kind: DocumentKind,
    ) -> Result<Option<Document>, StoreError> {
        self.store.find_one_where(kind, &Filter::derived_from(source))
    }

    fn resolve(&self, quote: &Document) -> Result<Resolved, LineageError> {
        let quote_ref = quote.reference();
        let purchase_order = self.derived(&quote_ref, DocumentKind::PurchaseOrder)?;
        let sibling_dn = self.derived(&quote_ref, DocumentKind::DeliveryNote)?;
        let sibling_invoice = self.derived(&quote_ref, DocumentKind::Invoice)?;
        if sibling_dn.is_some() || sibling_invoice.is_some() {
            return Ok(Resolved {
                purchase_order,
                delivery_note: sibling_dn,
                invoice: sibling_invoice,
                mode: Some(CascadeMode::Fanned),
            });
        }

        let delivery_note = match &purchase_order {
            Some(po) => self.derived(&po.reference(), DocumentKind::DeliveryNote)?,
            None => None,
        };
        let invoice = match &delivery_note {
            Some(dn) => self.derived(&dn.reference(), DocumentKind::Invoice)?,
            None => None,
        };
        let mode = delivery_note.as_ref().map(|_| CascadeMode::Chained);
        Ok(Resolved {
            purchase_order,
            delivery_note,
            invoice,
            mode,
        })
    }

    fn plan_purchase_order(&self, quote: &Document, quote_hash: &str) -> Document {
        let items = quote
            .items
            .iter()
            .map(|item| LineItem {
                line_uid: item.line_uid.clone(),
                description: item.description.clone(),
                unit: item.unit.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total: item.total,
                ..LineItem::default()
            })
            .collect();
        let mut po = Document::derived_from(DocumentKind::PurchaseOrder, quote).set_items(items);
        po.upstream_hash_at_sync = Some(quote_hash.to_string());
        self.stamp(&mut po);
        po
    }

    fn plan_delivery_note(&self, po: &Document) -> Document {
        let items = po
            .items
            .iter()
            .map(|item| project(item, DocumentKind::DeliveryNote, None, None))
            .collect();
        let mut dn = Document::derived_from(DocumentKind::DeliveryNote, po).set_items(items);
        dn.upstream_hash_at_sync = Some(self.fingerprint(&po.items));
        self.stamp(&mut dn);
        dn
    }

    // prices come from the purchase order, matched by line_uid
    fn plan_invoice(&self, dn: &Document, po: &Document) -> Document {
        let prices: HashMap<&str, &LineItem> = po
            .items
            .iter()
            .filter_map(|item| item.line_uid().map(|uid| (uid, item)))
            .collect();
        let items = dn
            .items
            .iter()
            .map(|item| {
                let priced = item.line_uid().and_then(|uid| prices.get(uid));
                project(
                    item,
                    DocumentKind::Invoice,
                    priced.and_then(|po_item| po_item.unit_price),
                    priced.and_then(|po_item| po_item.total),
                )
            })
            .collect();
        let mut invoice = Document::derived_from(DocumentKind::Invoice, dn).set_items(items);
        invoice.upstream_hash_at_sync = Some(self.fingerprint(&dn.items));
        self.stamp(&mut invoice);
        invoice
    }

    fn plan_sibling(
        &self,
        kind: DocumentKind,
        quote: &Document,
        quote_hash: &str,
    ) -> Document {
        let items = quote
            .items
            .iter()
            .map(|item| {
                let line = MoneyLine {
                    quantity: upstream_quantity(item),
                    unit_price: item.unit_price,
                };
                let total = money::to_f64(money::line_total(&line));
                project(item, kind, item.unit_price, Some(total))
            })
            .collect();
        let mut sibling = Document::derived_from(kind, quote).set_items(items);
        sibling.upstream_hash_at_sync = Some(quote_hash.to_string());
        self.stamp(&mut sibling);
        sibling
    }

    fn run_stage(
        &self,
        found: Option<Document>,
        planned: Document,
        report: &mut CascadeReport,
    ) -> Result<Document, LineageError> {
        let (document, result) = self.commit_stage(found, planned, &report.committed())?;
        report.stages.push(result);
        Ok(document)
    }

    // Creates `planned` unless `found` already holds the stage's output. The
    // header goes in without a content hash, which is only patched on once
    // the items are written; a found header still lacking it is finished
    // from `planned`.
    fn commit_stage(
        &self,
        found: Option<Document>,
        mut planned: Document,
        committed: &[DocumentRef],
    ) -> Result<(Document, StageResult), LineageError> {
        let stage = planned.kind;
        let failed = |source: StoreError, committed: Vec<DocumentRef>| {
            warn!(%stage, error = %source, committed = committed.len(), "stage failed, lineage left partial");
            LineageError::DocumentCreationFailed {
                stage,
                committed,
                source,
            }
        };

        if let Some(mut document) = found {
            if is_complete(&document) {
                let result = StageResult::Existing(document.reference());
                return Ok((document, result));
            }
            let mut with_header = committed.to_vec();
            with_header.push(document.reference());

            document.discount_percent = planned.discount_percent;
            document.items = planned.items;
            document.upstream_hash_at_sync = planned.upstream_hash_at_sync;
            self.stamp(&mut document);
            self.write_items(&document)
                .map_err(|source| failed(source, with_header))?;

            warn!(%stage, id = %document.id, "resumed a stage left unfinished");
            let result = StageResult::Resumed(document.reference());
            return Ok((document, result));
        }

        planned.id = new_id(stage.hrp());
        planned.number = self
            .next_number(&planned)
            .map_err(|source| failed(source, committed.to_vec()))?;
        let header = Document {
            content_hash: None,
            ..planned.header()
        };
        self.store
            .insert(&header)
            .map_err(|source| failed(source, committed.to_vec()))?;

        let mut with_header = committed.to_vec();
        with_header.push(planned.reference());
        self.write_items(&planned)
            .map_err(|source| failed(source, with_header))?;

        info!(%stage, id = %planned.id, number = %planned.number, "document created");
        let result = StageResult::Created(planned.reference());
        Ok((planned, result))
    }

    fn next_number(&self, document: &Document) -> Result<String, StoreError> {
        let existing = self.store.numbers(document.kind)?;
        Ok(self
            .config
            .numbering(document.kind)
            .next(&existing, document.date.year()))
    }

    fn mark_accepted(&self, quote: &Document) -> Result<(), LineageError> {
        if quote.status == DocumentStatus::Accepted {
            return Ok(());
        }
        self.store.update_where(
            DocumentKind::Quote,
            &Filter::by_id(&quote.id),
            &DocumentPatch::status(DocumentStatus::Accepted),
        )?;
        info!(quote_id = %quote.id, "quote accepted");
        Ok(())
    }
}

// a stage's content hash is written last, after its items
fn is_complete(document: &Document) -> bool {
    document.content_hash.is_some()
}

fn guard_topology(
    quote: &Document,
    existing: &Resolved,
    requested: CascadeMode,
) -> Result<(), LineageError> {
    match existing.mode {
        Some(mode) if mode != requested => Err(LineageError::TopologyMismatch {
            quote_id: quote.id.clone(),
            existing: mode,
            requested,
        }),
        _ => Ok(()),
    }
}

fn with_line_uids(items: &[LineItem]) -> Vec<LineItem> {
    items
        .iter()
        .map(|item| LineItem {
            line_uid: Some(item.line_uid.clone().unwrap_or_else(new_line_uid)),
            ..item.clone()
        })
        .collect()
}
