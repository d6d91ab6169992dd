//! homelink-core — fragment types, wire format, chunk codec, and configuration.
//! All other homelink crates depend on this one.

pub mod codec;
pub mod config;
pub mod stream_id;
pub mod wire;

pub use codec::{encode, expected_length, fragment_count, CodecError, Fragment, StreamMeta};
pub use stream_id::{StreamId, StreamIdGenerator};
pub use wire::{PayloadKind, WireError};
