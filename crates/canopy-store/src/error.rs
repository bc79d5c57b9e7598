use canopy_types::TypeError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The input to a mutating operation is malformed; nothing was written.
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] TypeError),

    /// No live row matches the requested identifier.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The operation is permanently disallowed by this store.
    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    /// Failure reported by the underlying database.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The store has been shut down.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_not_permitted(&self) -> bool {
        matches!(self, Self::NotPermitted(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
