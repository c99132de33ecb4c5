//! Extraction of canonical item records from the two sources.

pub mod document;
pub mod money;
pub mod patterns;
pub mod portal;
pub mod xml;

pub use document::DocumentExtractor;
pub use portal::PortalReportExtractor;
