//! Messaging substrate for the gossip node.
//!
//! Implements the pieces the gossip engine consumes:
//! - Wire envelope and body encoding
//! - Request/reply correlation
//! - Serialized line output

pub mod message;
pub mod transport;

pub use message::{kinds, Body, ErrorCode, Message};
pub use transport::{LineTransport, Outbound, ReplyCallback, TransportConfig};
