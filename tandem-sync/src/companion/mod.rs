//! Companion device replication.
//!
//! A companion is a paired device (a watch, a phone) that receives the full
//! record set whenever it changes locally and sends its own full set back.
//! Incoming sets are reconciled: whatever the partner no longer holds is
//! deleted here.

mod backend;
mod link;
mod payload;

pub use backend::{CompanionBackend, RetryPolicy, receive_payload, spawn_listener};
pub use link::{ChannelLink, CompanionLink, NullLink};
pub use payload::{CompanionPayload, UNKNOWN_TIMESTAMP};
