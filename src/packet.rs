//! Packet model for the id-type-length-body wire format.
//!
//! ```text
//! offset 0..4:  id      (u32 BE, routing key, never 0 on the wire)
//! offset 4..6:  type    (u16 BE, PING=1234, SYNC=1235, BUSINESS=1236)
//! offset 6..10: length  (u32 BE, byte length of body)
//! offset 10..:  body    (exactly `length` bytes)
//! ```

use bytes::Bytes;

/// Fixed header size: id (4) + type (2) + length (4).
pub const HEADER_LEN: usize = 10;

/// Packet types accepted on the wire.
///
/// `Business` is the upper bound of the accepted range; there are no
/// business sub-kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    Ping = 1234,
    Sync = 1235,
    Business = 1236,
}

impl PacketType {
    /// Wire value of this type.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Map a wire value into the accepted range.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1234 => Some(PacketType::Ping),
            1235 => Some(PacketType::Sync),
            1236 => Some(PacketType::Business),
            _ => None,
        }
    }
}

/// A single framed packet.
///
/// `kind` holds the raw wire `type`. Replies built by handlers may leave it
/// at 0; only decoded packets are guaranteed to carry a [`PacketType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Routing key selecting the handler.
    pub id: u32,
    /// Raw packet type.
    pub kind: u16,
    /// Body length; 0 means "compute from body" when encoding.
    pub length: u32,
    /// Opaque body.
    pub body: Bytes,
}

impl Packet {
    /// Build a packet of a known type. `length` is left unset.
    pub fn new(id: u32, kind: PacketType, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            kind: kind.as_u16(),
            length: 0,
            body: body.into(),
        }
    }

    /// Build a reply routed back under `id` with the type left unset.
    pub fn reply(id: u32, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            kind: 0,
            length: 0,
            body: body.into(),
        }
    }

    /// Decoded type, if `kind` is in the accepted range.
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u16(self.kind)
    }

    /// Total framed size.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }
}
