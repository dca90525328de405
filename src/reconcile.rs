//! Staleness checks and full-replace reconciliation of downstream documents
//!
//! A document is in sync with its upstream when the hash it recorded at its
//! last copy equals the fingerprint of the upstream's current items. Applying
//! a sync throws the downstream items away and rewrites them from the
//! upstream, so edits made directly on the downstream document are lost.
use crate::diff::{DiffResult, diff};
use crate::document::{Document, DocumentKind, DocumentRef, LineItem};
use crate::error::LineageError;
use crate::fingerprint::{FingerprintOrder, fingerprint_items};
use crate::money::{self, MoneyLine};
use crate::normalize::{project, upstream_quantity};
use crate::store::{DocumentPatch, DocumentStore, Filter};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// The document was not derived from anything.
    NoUpstream,
    /// Derived, but no hash was ever recorded.
    NeverSynced,
    InSync,
    Stale { recorded: String, current: String },
}

impl SyncState {
    pub fn is_stale(&self) -> bool {
        matches!(self, SyncState::Stale { .. } | SyncState::NeverSynced)
    }
}

#[derive(Debug, Clone)]
pub struct SyncPreview {
    pub downstream: Document,
    pub upstream: Option<Document>,
    pub diff: DiffResult,
    pub state: SyncState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NothingToApply,
    Applied {
        document: DocumentRef,
        upstream_hash: String,
        added: usize,
        removed: usize,
        changed: usize,
    },
}

pub struct SyncReconciler<S> {
    store: S,
    order: FingerprintOrder,
}

impl<S: DocumentStore> SyncReconciler<S> {
    pub fn new(store: S, order: FingerprintOrder) -> Self {
        Self { store, order }
    }

    fn load(&self, doc: &DocumentRef) -> Result<Document, LineageError> {
        self.store
            .find_by_id(doc.kind, &doc.id)?
            .ok_or_else(|| LineageError::not_found(doc))
    }

    // a lineage edge pointing nowhere is reported as the upstream not being found
    fn upstream_of(&self, document: &Document) -> Result<Option<Document>, LineageError> {
        match &document.source {
            Some(source) => self.load(source).map(Some),
            None => Ok(None),
        }
    }

    pub fn sync_state(&self, doc: &DocumentRef) -> Result<SyncState, LineageError> {
        let document = self.load(doc)?;
        let upstream = self.upstream_of(&document)?;
        Ok(self.state_of(&document, upstream.as_ref()))
    }

    /// Everything a reviewer needs before confirming a sync.
    #[instrument(skip(self))]
    pub fn preview(&self, doc: &DocumentRef) -> Result<SyncPreview, LineageError> {
        let downstream = self.load(doc)?;
        let upstream = self.upstream_of(&downstream)?;
        let state = self.state_of(&downstream, upstream.as_ref());
        let diff = match &upstream {
            Some(upstream) => diff(&upstream.items, &downstream.items),
            None => DiffResult::default(),
        };
        Ok(SyncPreview {
            downstream,
            upstream,
            diff,
            state,
        })
    }

    /// Replace the document's items with ones derived from its upstream.
    ///
    /// The whole upstream set is rewritten, not only the lines `diff` names;
    /// `diff` gates whether anything happens at all.
    #[instrument(skip(self, diff))]
    pub fn apply(&self, diff: &DiffResult, doc: &DocumentRef) -> Result<SyncOutcome, LineageError> {
        if diff.has_blocking_conflicts() {
            return Err(LineageError::BlockingConflicts(diff.conflicts.len()));
        }
        if diff.is_empty() {
            return Ok(SyncOutcome::NothingToApply);
        }

        let downstream = self.load(doc)?;
        let Some(upstream) = self.upstream_of(&downstream)? else {
            return Err(LineageError::NoUpstream {
                kind: doc.kind,
                id: doc.id.clone(),
            });
        };

        // a copied line without identity could never be matched again
        let count = upstream
            .items
            .iter()
            .filter(|item| item.line_uid().is_none())
            .count();
        if count > 0 {
            return Err(LineageError::UnidentifiedLines {
                upstream: upstream.reference(),
                count,
            });
        }

        let items = self.rebuild_items(&downstream, &upstream);
        let upstream_hash = fingerprint_items(&upstream.items, self.order);
        let patch = DocumentPatch {
            content_hash: Some(fingerprint_items(&items, self.order)),
            upstream_hash_at_sync: Some(upstream_hash.clone()),
            totals: Some(money::compute_items(
                doc.kind,
                &items,
                downstream.discount_percent,
            )),
            ..DocumentPatch::default()
        };

        // not atomic, a failure between these leaves the document short of items
        self.store.delete_items_where(doc.kind, &doc.id)?;
        self.store.insert_many(doc.kind, &doc.id, &items)?;
        self.store
            .update_where(doc.kind, &Filter::by_id(&doc.id), &patch)?;

        info!(
            upstream = %upstream.reference(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "document synced"
        );
        Ok(SyncOutcome::Applied {
            document: doc.clone(),
            upstream_hash,
            added: diff.added.len(),
            removed: diff.removed.len(),
            changed: diff.changed.len(),
        })
    }

    fn state_of(&self, document: &Document, upstream: Option<&Document>) -> SyncState {
        let Some(upstream) = upstream else {
            return SyncState::NoUpstream;
        };
        let current = fingerprint_items(&upstream.items, self.order);
        match &document.upstream_hash_at_sync {
            None => SyncState::NeverSynced,
            Some(recorded) if *recorded == current => SyncState::InSync,
            Some(recorded) => SyncState::Stale {
                recorded: recorded.clone(),
                current,
            },
        }
    }

    // Upstream items projected into the downstream's shape. Prices come from
    // the upstream line, else the upstream's own upstream, else the line being
    // replaced. Delivery notes cut from a purchase order stay unpriced.
    fn rebuild_items(&self, downstream: &Document, upstream: &Document) -> Vec<LineItem> {
        let unpriced = downstream.kind == DocumentKind::DeliveryNote
            && upstream.kind == DocumentKind::PurchaseOrder;
        if unpriced {
            return upstream
                .items
                .iter()
                .map(|item| project(item, downstream.kind, None, None))
                .collect();
        }

        let grand_upstream = match self.upstream_of(upstream) {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "upstream's own upstream unavailable, pricing without it");
                None
            }
        };
        let mut prices: HashMap<&str, f64> = HashMap::new();
        for item in downstream.items.iter().chain(
            grand_upstream
                .iter()
                .flat_map(|document| document.items.iter()),
        ) {
            if let (Some(uid), Some(price)) = (item.line_uid(), item.unit_price) {
                prices.insert(uid, price);
            }
        }

        upstream
            .items
            .iter()
            .map(|item| {
                let unit_price = item
                    .unit_price
                    .or_else(|| item.line_uid().and_then(|uid| prices.get(uid).copied()));
                let total = unit_price.map(|price| {
                    money::to_f64(money::line_total(&MoneyLine {
                        quantity: upstream_quantity(item),
                        unit_price: Some(price),
                    }))
                });
                project(item, downstream.kind, unit_price, total)
            })
            .collect()
    }
}
