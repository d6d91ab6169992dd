//! homelink wire format — one fragment per bus message.
//!
//! Every message is a fixed `FragmentHeader` followed by the producer id,
//! the producer kind (both UTF-8, lengths in the header) and then the
//! fragment data, which runs to the end of the message.
//!
//! Integers are little-endian and the header has alignment 1, so it can be
//! read straight out of a received buffer with zerocopy. There is no unsafe
//! code in this module.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::codec::Fragment;
use crate::stream_id::StreamId;

// ── Fragment Header ──────────────────────────────────────────────────────────

/// Fixed prefix of every fragment message.
///
/// Wire size: 38 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FragmentHeader {
    /// Stream the fragment belongs to. Unique per in-flight transfer.
    pub stream_id: [u8; 16],

    /// Total payload length. Constant across all fragments of one stream.
    pub total_size: U32<LittleEndian>,

    /// Chunk size the sender split the payload with.
    /// Carried explicitly so the receiver never has to guess it from
    /// whichever fragment happens to arrive first.
    pub chunk_size: U32<LittleEndian>,

    /// Zero-based fragment index.
    pub sequence: U32<LittleEndian>,

    /// Declared number of data bytes in this fragment.
    pub length: U32<LittleEndian>,

    pub producer_id_len: U16<LittleEndian>,
    pub producer_kind_len: U16<LittleEndian>,

    /// See `PayloadKind`.
    pub payload_kind: u8,

    /// Wire format version. Currently 0x01.
    pub version: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FragmentHeader, [u8; 38]);

// ── Payload Kind ──────────────────────────────────────────────────────────────

/// What a stream carries. Passed through to the sink untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadKind {
    /// Camera snapshot from a home or vehicle device.
    Image = 0x01,

    /// Generated trend chart.
    Report = 0x02,
}

impl PayloadKind {
    /// File extension used when a payload of this kind is written to disk.
    pub fn extension(self) -> &'static str {
        match self {
            PayloadKind::Image => "jpg",
            PayloadKind::Report => "png",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PayloadKind::Image => "image",
            PayloadKind::Report => "report",
        }
    }
}

impl TryFrom<u8> for PayloadKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PayloadKind::Image),
            0x02 => Ok(PayloadKind::Report),
            other => Err(WireError::UnknownPayloadKind(other)),
        }
    }
}

impl From<PayloadKind> for u8 {
    fn from(k: PayloadKind) -> u8 {
        k as u8
    }
}

impl std::str::FromStr for PayloadKind {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(PayloadKind::Image),
            "report" => Ok(PayloadKind::Report),
            _ => Err(WireError::UnknownPayloadKindName(s.to_string())),
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current fragment format version.
pub const FRAGMENT_VERSION: u8 = 0x01;

/// Size of `FragmentHeader` on the wire.
pub const HEADER_SIZE: usize = 38;

/// Largest message the bus binding will carry (UDP datagram payload ceiling).
/// Header, tags and data together must fit.
pub const MAX_MESSAGE: usize = 65_507;

// ── Encode / Decode ───────────────────────────────────────────────────────────

impl Fragment {
    /// Frame this fragment as one bus message.
    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let producer_id = self.producer_id.as_bytes();
        let producer_kind = self.producer_kind.as_bytes();
        let producer_id_len =
            u16::try_from(producer_id.len()).map_err(|_| WireError::TagTooLong(producer_id.len()))?;
        let producer_kind_len = u16::try_from(producer_kind.len())
            .map_err(|_| WireError::TagTooLong(producer_kind.len()))?;

        let total = HEADER_SIZE + producer_id.len() + producer_kind.len() + self.data.len();
        if total > MAX_MESSAGE {
            return Err(WireError::MessageTooLarge(total));
        }

        let header = FragmentHeader {
            stream_id: *self.stream_id.as_bytes(),
            total_size: U32::new(self.total_size),
            chunk_size: U32::new(self.chunk_size),
            sequence: U32::new(self.sequence),
            length: U32::new(self.length),
            producer_id_len: U16::new(producer_id_len),
            producer_kind_len: U16::new(producer_kind_len),
            payload_kind: self.payload_kind.into(),
            version: FRAGMENT_VERSION,
        };

        let mut buf = BytesMut::with_capacity(total);
        buf.put_slice(header.as_bytes());
        buf.put_slice(producer_id);
        buf.put_slice(producer_kind);
        buf.put_slice(&self.data);
        Ok(buf.freeze())
    }

    /// Parse one bus message. The data slice shares `message`'s buffer.
    ///
    /// The declared `length` is not checked against the data here; the
    /// reassembler owns that decision.
    pub fn from_bytes(message: Bytes) -> Result<Fragment, WireError> {
        let header = FragmentHeader::read_from_prefix(&message)
            .ok_or(WireError::Truncated(message.len()))?;

        if header.version != FRAGMENT_VERSION {
            return Err(WireError::UnknownVersion(header.version));
        }
        let payload_kind = PayloadKind::try_from(header.payload_kind)?;

        let id_end = HEADER_SIZE + usize::from(header.producer_id_len.get());
        let kind_end = id_end + usize::from(header.producer_kind_len.get());
        if message.len() < kind_end {
            return Err(WireError::Truncated(message.len()));
        }

        let producer_id = tag(&message[HEADER_SIZE..id_end])?;
        let producer_kind = tag(&message[id_end..kind_end])?;

        Ok(Fragment {
            stream_id: StreamId::from_bytes(header.stream_id),
            producer_id,
            producer_kind,
            payload_kind,
            total_size: header.total_size.get(),
            chunk_size: header.chunk_size.get(),
            sequence: header.sequence.get(),
            length: header.length.get(),
            data: message.slice(kind_end..),
        })
    }
}

fn tag(bytes: &[u8]) -> Result<String, WireError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| WireError::InvalidTag)
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when framing or parsing a fragment message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("message truncated ({0} bytes)")]
    Truncated(usize),

    #[error("unknown fragment version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown payload kind: 0x{0:02x}")]
    UnknownPayloadKind(u8),

    #[error("unknown payload kind name: {0}")]
    UnknownPayloadKindName(String),

    #[error("producer tag is not valid UTF-8")]
    InvalidTag,

    #[error("producer tag of {0} bytes exceeds 65535")]
    TagTooLong(usize),

    #[error("message of {0} bytes exceeds maximum {}", MAX_MESSAGE)]
    MessageTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
