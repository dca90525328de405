//! Repository contract between the lineage core and whatever persists documents
use crate::document::{Document, DocumentKind, DocumentRef, DocumentStatus, LineItem};
use crate::error::StoreError;
use crate::money::Totals;

/// Row oriented access keyed by document kind (the table) and id.
///
/// Implementations are not expected to provide transactions. Every call is
/// committed on return, which is what makes a failed cascade leave a partial
/// but observable lineage behind.
pub trait DocumentStore {
    /// Fetches the header together with its items, in position order.
    fn find_by_id(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>, StoreError>;
    /// First document of `kind`, in creation order, matching `filter`.
    fn find_one_where(
        &self,
        kind: DocumentKind,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError>;
    /// Numbers of every document of `kind`, in creation order.
    fn numbers(&self, kind: DocumentKind) -> Result<Vec<String>, StoreError>;
    /// Persists the header only, items go through `insert_many`.
    fn insert(&self, document: &Document) -> Result<Document, StoreError>;
    /// Appends items after any the document already has.
    fn insert_many(
        &self,
        kind: DocumentKind,
        document_id: &str,
        items: &[LineItem],
    ) -> Result<Vec<LineItem>, StoreError>;
    /// Returns how many documents were patched.
    fn update_where(
        &self,
        kind: DocumentKind,
        filter: &Filter,
        patch: &DocumentPatch,
    ) -> Result<usize, StoreError>;
    /// Removes every item of a document, returning how many were removed.
    fn delete_items_where(&self, kind: DocumentKind, document_id: &str)
    -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub id: Option<String>,
    pub source: Option<DocumentRef>,
}

impl Filter {
    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }
    /// Documents whose lineage edge points at `source`.
    pub fn derived_from(source: &DocumentRef) -> Self {
        Self {
            source: Some(source.clone()),
            ..Self::default()
        }
    }
    pub fn matches(&self, document: &Document) -> bool {
        self.id.as_ref().is_none_or(|id| *id == document.id)
            && self
                .source
                .as_ref()
                .is_none_or(|source| document.source.as_ref() == Some(source))
    }
}

/// Fields the core ever rewrites on an existing document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub status: Option<DocumentStatus>,
    pub content_hash: Option<String>,
    pub upstream_hash_at_sync: Option<String>,
    pub totals: Option<Totals>,
}

impl DocumentPatch {
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
    pub fn apply_to(&self, document: &mut Document) {
        if let Some(status) = self.status {
            document.status = status;
        }
        if let Some(hash) = &self.content_hash {
            document.content_hash = Some(hash.clone());
        }
        if let Some(hash) = &self.upstream_hash_at_sync {
            document.upstream_hash_at_sync = Some(hash.clone());
        }
        if let Some(totals) = &self.totals {
            document.totals = Some(totals.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn po_of(quote: &str) -> Document {
        let mut doc = Document::new(DocumentKind::PurchaseOrder);
        doc.id = "po_1a".into();
        doc.number = "PO-2025-0001".into();
        doc.source = Some(DocumentRef::new(DocumentKind::Quote, quote));
        doc
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::default().matches(&po_of("quote_1")));
    }

    #[test]
    fn derived_from_matches_source_only() {
        let po = po_of("quote_1");
        assert!(Filter::derived_from(&DocumentRef::new(DocumentKind::Quote, "quote_1")).matches(&po));
        assert!(!Filter::derived_from(&DocumentRef::new(DocumentKind::Quote, "quote_2")).matches(&po));
        assert!(
            !Filter::derived_from(&DocumentRef::new(DocumentKind::PurchaseOrder, "quote_1"))
                .matches(&po)
        );
    }

    #[test]
    fn fields_combine_conjunctively() {
        let po = po_of("quote_1");
        let source = DocumentRef::new(DocumentKind::Quote, "quote_1");
        let filter = Filter {
            id: Some("po_1b".into()),
            ..Filter::derived_from(&source)
        };
        assert!(!filter.matches(&po));
        assert!(Filter::by_id("po_1a").matches(&po));
        assert!(
            Filter {
                id: Some("po_1a".into()),
                ..Filter::derived_from(&source)
            }
            .matches(&po)
        );
    }

    #[test]
    fn patch_leaves_unset_fields_alone() {
        let mut po = po_of("quote_1");
        po.content_hash = Some("old".into());
        let patch = DocumentPatch {
            upstream_hash_at_sync: Some("new".into()),
            ..DocumentPatch::status(DocumentStatus::Sent)
        };
        patch.apply_to(&mut po);

        assert_eq!(po.status, DocumentStatus::Sent);
        assert_eq!(po.content_hash.as_deref(), Some("old"));
        assert_eq!(po.upstream_hash_at_sync.as_deref(), Some("new"));
    }
}
