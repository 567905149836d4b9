//! `quoteflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod document_number;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use document_number::{DocumentKind, DocumentNumber, Period, DEFAULT_SEQUENCE_WIDTH};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AggregateId, BranchId, UserId};
