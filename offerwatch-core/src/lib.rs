//! # Offerwatch Core
//!
//! Domain layer for the offerwatch service: offer and target-site types,
//! the trait seams for the redundant scanner subsystems and the new-member
//! offer validator, and the shared offer store port with its in-memory
//! implementation.
//!
//! The HTTP surface and the job orchestration live in `offerwatch-server`;
//! this crate deliberately knows nothing about either.

pub mod error;
pub mod scan;
pub mod store;
pub mod types;

pub use error::{OfferError, Result};
pub use scan::{
    DailySweepScanner, NewMemberAuditor, NewMemberValidator, OfferScanner,
    ProxySweepScanner,
};
pub use store::{MemoryOfferStore, OfferStore};
pub use types::{
    Offer, OfferKind, ScanSummary, SeedSummary, TargetSite, ValidationSummary,
};
