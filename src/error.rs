use crate::document::{DocumentKind, DocumentRef};
use crate::service::CascadeMode;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("store backend: {0}")]
    Backend(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LineageError {
    #[error("{kind} {id} not found")]
    NotFound { kind: DocumentKind, id: String },
    #[error("failed to create {stage}; already committed: {}", describe_committed(.committed))]
    DocumentCreationFailed {
        stage: DocumentKind,
        committed: Vec<DocumentRef>,
        #[source]
        source: StoreError,
    },
    #[error("quote {quote_id} was already cascaded {existing}, refusing a {requested} cascade")]
    TopologyMismatch {
        quote_id: String,
        existing: CascadeMode,
        requested: CascadeMode,
    },
    #[error("{kind} {id} has no upstream document to sync from")]
    NoUpstream { kind: DocumentKind, id: String },
    #[error("{upstream} has {count} lines without a line_uid, they cannot be synced")]
    UnidentifiedLines { upstream: DocumentRef, count: usize },
    #[error("diff carries {0} unresolved conflicts")]
    BlockingConflicts(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LineageError {
    pub(crate) fn not_found(doc: &DocumentRef) -> Self {
        Self::NotFound {
            kind: doc.kind,
            id: doc.id.clone(),
        }
    }
}

fn describe_committed(committed: &[DocumentRef]) -> String {
    if committed.is_empty() {
        return "nothing".into();
    }
    committed
        .iter()
        .map(|doc| doc.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
