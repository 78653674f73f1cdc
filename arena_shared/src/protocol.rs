//! Wire protocol: 15-byte header, packet taxonomy, and the binary payload
//! codecs for all nine packet types.
//!
//! The codec is pure and allocation-light: it performs no I/O and validates
//! only lengths, never semantic ranges. All multi-byte fields are
//! big-endian. This is deliberately not `serde`-based — the header and
//! payload shapes are fixed-width wire formats, not a generic
//! serialization target.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// `b"GAME"` as a big-endian u32.
pub const PROTOCOL_ID: u32 = 0x4741_4D45;

pub const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 1 + 2;

/// Nine wire packet types, 0x01–0x09.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    ConnectReq = 0x01,
    ConnectAck = 0x02,
    Input = 0x03,
    Snapshot = 0x04,
    Ping = 0x05,
    Pong = 0x06,
    Disconnect = 0x07,
    Heartbeat = 0x08,
    ReliableEvent = 0x09,
}

impl PacketType {
    pub fn from_u8(b: u8) -> Result<Self, CodecError> {
        Ok(match b {
            0x01 => Self::ConnectReq,
            0x02 => Self::ConnectAck,
            0x03 => Self::Input,
            0x04 => Self::Snapshot,
            0x05 => Self::Ping,
            0x06 => Self::Pong,
            0x07 => Self::Disconnect,
            0x08 => Self::Heartbeat,
            0x09 => Self::ReliableEvent,
            other => return Err(CodecError::UnknownType(other)),
        })
    }
}

/// Fixed 15-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub protocol_id: u32,
    pub seq: u16,
    pub ack: u16,
    pub ack_bits: u32,
    pub kind: PacketType,
    pub payload_len: u16,
}

/// Encodes a full datagram: header followed by payload bytes verbatim.
pub fn encode(kind: PacketType, seq: u16, ack: u16, ack_bits: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(PROTOCOL_ID);
    buf.put_u16(seq);
    buf.put_u16(ack);
    buf.put_u32(ack_bits);
    buf.put_u8(kind as u8);
    buf.put_u16(payload.len() as u16);
    buf.extend_from_slice(payload);
    buf
}

/// Decodes a datagram into its header and payload slice.
///
/// A datagram whose first four bytes don't match [`PROTOCOL_ID`] is
/// rejected with [`CodecError::BadMagic`] and must be dropped silently by
/// the caller — never treated as a disconnect or fatal condition.
pub fn decode(bytes: &[u8]) -> Result<(PacketHeader, Bytes), CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader);
    }

    let mut buf = bytes;
    let protocol_id = buf.get_u32();
    if protocol_id != PROTOCOL_ID {
        return Err(CodecError::BadMagic);
    }
    let seq = buf.get_u16();
    let ack = buf.get_u16();
    let ack_bits = buf.get_u32();
    let kind = PacketType::from_u8(buf.get_u8())?;
    let payload_len = buf.get_u16();

    if buf.remaining() < payload_len as usize {
        return Err(CodecError::TruncatedPayload);
    }

    let payload = Bytes::copy_from_slice(&buf[..payload_len as usize]);

    Ok((
        PacketHeader {
            protocol_id,
            seq,
            ack,
            ack_bits,
            kind,
            payload_len,
        },
        payload,
    ))
}

// ─── Payload shapes ───

/// CONNECT_REQ carries no payload beyond the header.
pub fn encode_connect_req() -> BytesMut {
    BytesMut::new()
}

/// CONNECT_ACK: assigned client id (u8) + world bounds (2×f32), so a fresh
/// client can immediately clamp its prediction to the authoritative arena.
pub fn encode_connect_ack(client_id: u8, world_w: f32, world_h: f32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(client_id);
    buf.put_f32(world_w);
    buf.put_f32(world_h);
    buf
}

pub fn decode_connect_ack(mut payload: &[u8]) -> Result<(u8, f32, f32), CodecError> {
    if payload.len() < 9 {
        return Err(CodecError::TruncatedPayload);
    }
    let client_id = payload.get_u8();
    let world_w = payload.get_f32();
    let world_h = payload.get_f32();
    Ok((client_id, world_w, world_h))
}

/// One wire-encoded `Input`: seq(u32) moveX(f32) moveY(f32) actions(u8) = 13 bytes.
pub const INPUT_ENTRY_LEN: usize = 4 + 4 + 4 + 1;

pub fn encode_input_entry(buf: &mut BytesMut, seq: u32, move_x: f32, move_y: f32, actions: u8) {
    buf.put_u32(seq);
    buf.put_f32(move_x);
    buf.put_f32(move_y);
    buf.put_u8(actions);
}

pub fn decode_input_entry(payload: &mut &[u8]) -> Result<(u32, f32, f32, u8), CodecError> {
    if payload.len() < INPUT_ENTRY_LEN {
        return Err(CodecError::TruncatedPayload);
    }
    let seq = payload.get_u32();
    let move_x = payload.get_f32();
    let move_y = payload.get_f32();
    let actions = payload.get_u8();
    Ok((seq, move_x, move_y, actions))
}

/// INPUT payload: u8 count, then that many [`encode_input_entry`] records.
pub fn encode_input_payload(entries: &[(u32, f32, f32, u8)]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(1 + entries.len() * INPUT_ENTRY_LEN);
    buf.put_u8(entries.len() as u8);
    for &(seq, mx, my, actions) in entries {
        encode_input_entry(&mut buf, seq, mx, my, actions);
    }
    buf
}

pub fn decode_input_payload(mut payload: &[u8]) -> Result<Vec<(u32, f32, f32, u8)>, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::TruncatedPayload);
    }
    let count = payload.get_u8() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_input_entry(&mut payload)?);
    }
    Ok(out)
}

/// PING / PONG payload: an 8-byte timestamp echoed verbatim.
pub fn encode_timestamp(ts: u64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(ts);
    buf
}

pub fn decode_timestamp(mut payload: &[u8]) -> Result<u64, CodecError> {
    if payload.len() < 8 {
        return Err(CodecError::TruncatedPayload);
    }
    Ok(payload.get_u64())
}

/// DISCONNECT payload: none required; reason is local-only.
pub fn encode_disconnect() -> BytesMut {
    BytesMut::new()
}

/// HEARTBEAT payload: none.
pub fn encode_heartbeat() -> BytesMut {
    BytesMut::new()
}

/// RELIABLE_EVENT payload: an opaque application blob, passed through
/// verbatim. The ack tracker (not this codec) is responsible for
/// retransmission and de-duplication.
pub fn encode_reliable_event(blob: &[u8]) -> BytesMut {
    BytesMut::from(blob)
}
