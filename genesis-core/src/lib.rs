//! Genesis Mirror Core - assembling, attesting and serving chain genesis files
//!
//! A mirror keeps an append-only ledger of numbered units per category and
//! exposes artifacts built by concatenating unit files:
//! - full / pruned / minimal artifact kinds per category
//! - byte-range streaming across the backing files
//! - digest consensus with peer mirrors before an artifact is attested
//! - a catalog of everything currently downloadable

pub mod catalog;
pub mod config;
pub mod digest;
pub mod error;
pub mod locator;
pub mod operations;
pub mod peers;
pub mod rounds;
pub mod storage;
pub mod streamer;

pub use catalog::{Catalog, CatalogSnapshot, CategorySummary, GenesisArtifact};
pub use config::{CategoryConfig, Config, ConsensusConfig, DynamicFileConfig, PeerMirror, StaticFileConfig};
pub use digest::{ArtifactHasher, DigestAlgorithm};
pub use error::{GenesisError, Result};
pub use locator::{ArtifactKind, UnitType};
pub use operations::*;
pub use peers::{HashReport, HttpPeerTransport, PeerAck, PeerRecord, PeerTable, PeerTransport};
pub use rounds::{RoundId, RoundKey, RoundScheduler, RoundStatus};
pub use storage::{AttestationStore, LatestUnit, LedgerDocument, LedgerFiles, Unit, UnitCategory, UnitLedger};
pub use streamer::{ByteRange, ChunkSink, ContentRange, RangeStreamer, Transfer, TransferOutcome};
