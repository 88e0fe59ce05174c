//! Core types, normalization, and fingerprinting for the Watchtower pipeline.

pub mod error;
pub mod event;
pub mod fingerprint;
pub mod limits;
pub mod normalize;
pub mod otlp;

pub use error::{Error, Result, StoreErrorCode, ValidationErrorCode};
pub use event::*;
pub use fingerprint::{fingerprint, issue_culprit, issue_title};
pub use normalize::{normalize_batch, normalize_event, IngressPayload, ScopeContext};
