//! Error types for the auditax-core library.

use thiserror::Error;

use crate::models::item::Origin;

/// Main error type for the auditax library.
///
/// Every fatal condition of an audit run is one of these three kinds.
#[derive(Error, Debug)]
pub enum AuditaxError {
    /// The invoice document could not be parsed.
    #[error("document error: {0}")]
    Document(#[from] DocumentParseError),

    /// The portal report yielded no items.
    #[error("portal error: {0}")]
    Portal(#[from] PortalExtractionError),

    /// Reconciliation failed.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Errors related to the invoice document.
#[derive(Error, Debug)]
pub enum DocumentParseError {
    /// The markup is not well formed.
    #[error("malformed XML at byte {position}: {reason}")]
    Xml { position: u64, reason: String },

    /// The document has no root element.
    #[error("document has no root element")]
    MissingRoot,

    /// The invoice-info node could not be located.
    #[error("invoice info node (infNFe) not found")]
    MissingInvoiceInfo,
}

/// Errors related to the portal report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalExtractionError {
    /// No item block produced a valid record.
    #[error("no items extracted from portal report ({blocks_found} item blocks found)")]
    NoItems { blocks_found: usize },
}

/// Errors raised while reconciling the two item lists.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A source item list repeats an item index.
    #[error("duplicate item index {index} in {origin} items")]
    DuplicateItemIndex { origin: Origin, index: u32 },

    /// Any other failure, wrapped with context.
    #[error("{context}: {source}")]
    Unexpected {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AuditError {
    /// Wrap a foreign error with context.
    pub fn unexpected(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unexpected {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// A canonical item record failed its validity checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Item index must be positive.
    #[error("item index must be positive, got {0}")]
    InvalidItemIndex(u32),

    /// Monetary and percentage fields must not be negative.
    #[error("{field} must not be negative: {value}")]
    NegativeValue { field: &'static str, value: String },
}

/// A reconciliation rule could not evaluate a pair of items.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// A code could not be normalized.
    #[error("malformed {field} code: {value:?}")]
    MalformedCode { field: &'static str, value: String },

    /// Decimal arithmetic overflowed.
    #[error("arithmetic overflow comparing {0}")]
    Overflow(&'static str),
}

/// A tax calculation has no defined result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculationError {
    /// The internal rate is 100%, so the adjustment divides by zero.
    #[error("internal rate of 100% leaves no adjusted margin")]
    FullInternalRate,

    /// Decimal arithmetic overflowed.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// Result type for the auditax library.
pub type Result<T> = std::result::Result<T, AuditaxError>;
