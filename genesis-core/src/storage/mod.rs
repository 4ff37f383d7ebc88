//! Storage modules for Genesis Mirror
//!
//! Provides the unit ledger and attestation files.

pub mod attestation_store;
pub mod unit_ledger;

pub use attestation_store::AttestationStore;
pub use unit_ledger::{LatestUnit, LedgerDocument, LedgerFiles, Unit, UnitCategory, UnitLedger};
