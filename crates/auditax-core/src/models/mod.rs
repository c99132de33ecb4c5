//! Data models shared by the extractors and the audit engine.

pub mod audit;
pub mod config;
pub mod invoice;
pub mod item;
