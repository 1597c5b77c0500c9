//! Packet framing.
//!
//! [`Codec`] turns packets into wire bytes and reads packets back off a
//! byte stream. [`PacketCodec`] is the big-endian id-type-length-body
//! implementation used by the server.

use crate::error::{ProtocolViolation, Result};
use crate::packet::{Packet, PacketType};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Default upper bound on a decoded body (16 MiB).
pub const DEFAULT_MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

/// Encoding and decoding of framed packets.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Serialize a packet into a single frame.
    fn encode(&self, packet: &Packet) -> std::result::Result<Bytes, ProtocolViolation>;

    /// Read exactly one packet from `reader`.
    ///
    /// Either a whole packet is returned or the call fails; nothing is
    /// buffered across calls.
    async fn decode(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<Packet>;
}

/// Big-endian id-type-length-body codec.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    max_body_len: u32,
}

impl PacketCodec {
    /// Create a codec that rejects bodies longer than `max_body_len`.
    pub fn new(max_body_len: u32) -> Self {
        Self { max_body_len }
    }

    /// Largest body this codec will decode.
    pub fn max_body_len(&self) -> u32 {
        self.max_body_len
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_LEN)
    }
}

#[async_trait]
impl Codec for PacketCodec {
    fn encode(&self, packet: &Packet) -> std::result::Result<Bytes, ProtocolViolation> {
        let actual = packet.body.len();

        // A zero length means the caller left it for us to fill in.
        let length = match packet.length {
            0 => u32::try_from(actual).map_err(|_| ProtocolViolation::BodyTooLarge {
                length: actual as u64,
                max: u32::MAX,
            })?,
            declared if declared as usize == actual => declared,
            declared => return Err(ProtocolViolation::LengthMismatch { declared, actual }),
        };

        let mut buf = BytesMut::with_capacity(packet.frame_len());
        buf.put_u32(packet.id);
        buf.put_u16(packet.kind);
        buf.put_u32(length);
        buf.put_slice(&packet.body);

        Ok(buf.freeze())
    }

    async fn decode(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<Packet> {
        let id = reader.read_u32().await?;
        if id == 0 {
            return Err(ProtocolViolation::ZeroId.into());
        }

        let kind = reader.read_u16().await?;
        if PacketType::from_u16(kind).is_none() {
            return Err(ProtocolViolation::UnknownType(kind).into());
        }

        let length = reader.read_u32().await?;
        if length > self.max_body_len {
            return Err(ProtocolViolation::BodyTooLarge {
                length: u64::from(length),
                max: self.max_body_len,
            }
            .into());
        }

        let mut body = BytesMut::zeroed(length as usize);
        reader.read_exact(&mut body).await?;

        trace!(id, kind, length, "Decoded packet");

        Ok(Packet {
            id,
            kind,
            length,
            body: body.freeze(),
        })
    }
}
