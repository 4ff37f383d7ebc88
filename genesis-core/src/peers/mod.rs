//! Peer mirrors and the digests they report.

pub mod peer_table;
pub mod transport;

pub use peer_table::{PeerRecord, PeerTable};
pub use transport::{HashReport, HttpPeerTransport, PeerAck, PeerTransport};
