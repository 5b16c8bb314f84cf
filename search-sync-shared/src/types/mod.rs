//! This module defines the core data structures and types used across the search sync pipeline.

pub mod entity_type;
pub mod index_document;
pub mod reconciliation;
pub mod record;
pub mod sync_job;
