//! homelink-services — stream reassembly, producer transfers, and the
//! transport and sink seams they plug into.

pub mod loopback;
pub mod reassembler;
pub mod sink;
pub mod stats;
pub mod stream_table;
pub mod transfer;
pub mod transport;

pub use loopback::LoopbackTransport;
pub use reassembler::{IngestOutcome, MalformedFragment, ReassemblyLimits, StreamReassembler};
pub use sink::{ChannelSink, CompletedPayload, Sink};
pub use stats::{ReassemblyStats, StatsSnapshot};
pub use stream_table::{EvictedStream, StreamProgress, StreamTable};
pub use transfer::{Transfer, TransferError};
pub use transport::{FragmentHandler, TransportError, TransportPort};
