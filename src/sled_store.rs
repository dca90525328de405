//! Embedded `DocumentStore` over sled
//!
//! Per kind there are four trees: headers keyed by id, items keyed by
//! `{document_id}/{position}`, a sequence tree keyed by `Db::generate_id`
//! recording creation order, and a lineage index keyed by
//! `{source_table}/{source_id}/{sequence}`.
use crate::document::{Document, DocumentKind, DocumentRef, LineItem};
use crate::error::StoreError;
use crate::store::{DocumentPatch, DocumentStore, Filter};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Batch, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }

    fn headers(&self, kind: DocumentKind) -> Result<Tree, StoreError> {
        Ok(self.instance.open_tree(kind.table())?)
    }

    fn items(&self, kind: DocumentKind) -> Result<Tree, StoreError> {
        Ok(self.instance.open_tree(format!("{}_items", kind.table()))?)
    }

    fn sequence(&self, kind: DocumentKind) -> Result<Tree, StoreError> {
        Ok(self.instance.open_tree(format!("{}_seq", kind.table()))?)
    }

    fn by_source(&self, kind: DocumentKind) -> Result<Tree, StoreError> {
        Ok(self.instance.open_tree(format!("{}_by_source", kind.table()))?)
    }

    fn load_items(&self, kind: DocumentKind, document_id: &str) -> Result<Vec<LineItem>, StoreError> {
        let mut items = vec![];
        for entry in self.items(kind)?.scan_prefix(item_prefix(document_id)) {
            let (_, value) = entry?;
            items.push(minicbor::decode::<LineItem>(&value)?);
        }
        Ok(items)
    }

    // headers only, in the order they were first inserted
    fn headers_in_order(&self, kind: DocumentKind) -> Result<Vec<Document>, StoreError> {
        let headers = self.headers(kind)?;
        let mut documents = vec![];
        for entry in self.sequence(kind)?.iter() {
            let (_, id) = entry?;
            if let Some(bytes) = headers.get(&id)? {
                documents.push(minicbor::decode::<Document>(&bytes)?);
            }
        }
        Ok(documents)
    }

    fn header(&self, headers: &Tree, id: &[u8]) -> Result<Option<Document>, StoreError> {
        match headers.get(id)? {
            Some(bytes) => Ok(Some(minicbor::decode::<Document>(&bytes)?)),
            None => Ok(None),
        }
    }

    // Headers that can match `filter`, in creation order. An id goes straight
    // to its row and a source through the lineage index, anything else scans.
    fn candidates(&self, kind: DocumentKind, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let headers = self.headers(kind)?;
        if let Some(id) = &filter.id {
            return Ok(self.header(&headers, id.as_bytes())?.into_iter().collect());
        }
        let Some(source) = &filter.source else {
            return self.headers_in_order(kind);
        };
        let mut documents = vec![];
        for entry in self.by_source(kind)?.scan_prefix(source_prefix(source)) {
            let (_, id) = entry?;
            if let Some(document) = self.header(&headers, &id)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn put_header(&self, tree: &Tree, document: &Document) -> Result<(), StoreError> {
        let bytes = encode(&document.header())?;
        tree.insert(document.id.as_bytes(), bytes)?;
        Ok(())
    }
}

impl DocumentStore for SledStore {
    fn find_by_id(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>, StoreError> {
        let Some(bytes) = self.headers(kind)?.get(id.as_bytes())? else {
            return Ok(None);
        };
        let mut document: Document = minicbor::decode(&bytes)?;
        document.items = self.load_items(kind, id)?;
        Ok(Some(document))
    }

    fn find_one_where(
        &self,
        kind: DocumentKind,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let Some(header) = self
            .candidates(kind, filter)?
            .into_iter()
            .find(|document| filter.matches(document))
        else {
            return Ok(None);
        };
        let items = self.load_items(kind, &header.id)?;
        Ok(Some(Document { items, ..header }))
    }

    fn numbers(&self, kind: DocumentKind) -> Result<Vec<String>, StoreError> {
        Ok(self
            .headers_in_order(kind)?
            .into_iter()
            .map(|document| document.number)
            .collect())
    }

    fn insert(&self, document: &Document) -> Result<Document, StoreError> {
        let headers = self.headers(document.kind)?;
        if headers.contains_key(document.id.as_bytes())? {
            self.put_header(&headers, document)?;
        } else {
            // a header missing from the sequence or the index would never be found again
            let bytes = encode(&document.header())?;
            let seq = self.instance.generate_id()?.to_be_bytes();
            let index_key = document.source.as_ref().map(|source| source_key(source, seq));
            let sequence = self.sequence(document.kind)?;
            let by_source = self.by_source(document.kind)?;
            (&headers, &sequence, &by_source)
                .transaction(|(headers, sequence, by_source)| {
                    headers.insert(document.id.as_bytes(), bytes.as_slice())?;
                    sequence.insert(seq.as_slice(), document.id.as_bytes())?;
                    if let Some(key) = &index_key {
                        by_source.insert(key.as_slice(), document.id.as_bytes())?;
                    }
                    Ok::<(), ConflictableTransactionError<()>>(())
                })
                .map_err(aborted)?;
        }
        debug!(kind = %document.kind, id = %document.id, number = %document.number, "document inserted");
        Ok(document.header())
    }

    fn insert_many(
        &self,
        kind: DocumentKind,
        document_id: &str,
        items: &[LineItem],
    ) -> Result<Vec<LineItem>, StoreError> {
        let tree = self.items(kind)?;
        let offset = tree.scan_prefix(item_prefix(document_id)).count();

        let mut batch = Batch::default();
        for (position, item) in items.iter().enumerate() {
            batch.insert(item_key(document_id, offset + position).as_bytes(), encode(item)?);
        }
        tree.apply_batch(batch)?;

        debug!(%kind, document_id, count = items.len(), "items inserted");
        Ok(items.to_vec())
    }

    fn update_where(
        &self,
        kind: DocumentKind,
        filter: &Filter,
        patch: &DocumentPatch,
    ) -> Result<usize, StoreError> {
        let headers = self.headers(kind)?;
        let mut updated = 0;
        for mut document in self.candidates(kind, filter)? {
            if !filter.matches(&document) {
                continue;
            }
            patch.apply_to(&mut document);
            self.put_header(&headers, &document)?;
            updated += 1;
        }
        debug!(%kind, updated, "documents patched");
        Ok(updated)
    }

    fn delete_items_where(
        &self,
        kind: DocumentKind,
        document_id: &str,
    ) -> Result<usize, StoreError> {
        let tree = self.items(kind)?;
        let mut batch = Batch::default();
        let mut removed = 0;
        for entry in tree.scan_prefix(item_prefix(document_id)) {
            let (key, _) = entry?;
            batch.remove(key);
            removed += 1;
        }
        tree.apply_batch(batch)?;

        debug!(%kind, document_id, removed, "items deleted");
        Ok(removed)
    }
}

fn source_prefix(source: &DocumentRef) -> Vec<u8> {
    format!("{}/{}/", source.kind.table(), source.id).into_bytes()
}

fn source_key(source: &DocumentRef, seq: [u8; 8]) -> Vec<u8> {
    let mut key = source_prefix(source);
    key.extend_from_slice(&seq);
    key
}

fn aborted(err: TransactionError<()>) -> StoreError {
    match err {
        TransactionError::Storage(err) => StoreError::Sled(err),
        TransactionError::Abort(()) => StoreError::Backend("insert transaction aborted".into()),
    }
}

fn item_prefix(document_id: &str) -> String {
    format!("{document_id}/")
}

fn item_key(document_id: &str, position: usize) -> String {
    format!("{document_id}/{position:08}")
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|err| StoreError::Encode(err.to_string()))
}
