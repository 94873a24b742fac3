//! MQTT 3.1.1 packet encoding and decoding
//!
//! The subset a mock broker needs: CONNECT/CONNACK, PUBLISH at QoS 0/1 with
//! PUBACK, SUBSCRIBE/SUBACK, UNSUBSCRIBE/UNSUBACK, PINGREQ/PINGRESP, and
//! DISCONNECT. QoS 2 publishes are accepted and acknowledged as QoS 1.

use std::io::{Cursor, Read};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Protocol-level failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("invalid remaining length encoding")]
    InvalidRemainingLength,

    #[error("invalid protocol name: {0}")]
    InvalidProtocolName(String),

    #[error("invalid protocol level: {0}")]
    InvalidProtocolLevel(u8),

    #[error("invalid QoS level: {0}")]
    InvalidQoS(u8),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("malformed packet")]
    MalformedPacket,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for codec operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// CONNACK return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnackCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernamePassword = 4,
    NotAuthorized = 5,
}

/// Client will message carried in CONNECT
#[derive(Debug, Clone)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

/// CONNECT packet fields
#[derive(Debug, Clone)]
pub struct ConnectPacket {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub will: Option<LastWill>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// PUBLISH packet fields
#[derive(Debug, Clone)]
pub struct PublishPacket {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    pub dup: bool,
    pub packet_id: Option<u16>,
}

/// An MQTT control packet
#[derive(Debug, Clone)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck { session_present: bool, code: ConnackCode },
    Publish(PublishPacket),
    PubAck { packet_id: u16 },
    Subscribe { packet_id: u16, filters: Vec<(String, u8)> },
    SubAck { packet_id: u16, return_codes: Vec<u8> },
    Unsubscribe { packet_id: u16, filters: Vec<String> },
    UnsubAck { packet_id: u16 },
    PingReq,
    PingResp,
    Disconnect,
}

/// Read one packet from the stream
pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_packet_size: usize,
) -> ProtocolResult<Packet> {
    let first = match reader.read_u8().await {
        Ok(byte) => byte,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    };

    let mut remaining: usize = 0;
    let mut shift = 0u32;
    loop {
        let byte = reader.read_u8().await?;
        remaining |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 21 {
            return Err(ProtocolError::InvalidRemainingLength);
        }
    }
    if remaining > max_packet_size {
        return Err(ProtocolError::PacketTooLarge(remaining));
    }

    let mut body = vec![0u8; remaining];
    reader.read_exact(&mut body).await?;
    parse_packet(first, &body)
}

fn parse_packet(first: u8, body: &[u8]) -> ProtocolResult<Packet> {
    let packet_type = first >> 4;
    let flags = first & 0x0f;
    let mut cursor = Cursor::new(body);
    match packet_type {
        1 => parse_connect(&mut cursor),
        3 => parse_publish(flags, &mut cursor, body.len()),
        4 => Ok(Packet::PubAck {
            packet_id: read_u16(&mut cursor)?,
        }),
        8 => parse_subscribe(&mut cursor, body.len()),
        10 => parse_unsubscribe(&mut cursor, body.len()),
        12 => Ok(Packet::PingReq),
        14 => Ok(Packet::Disconnect),
        other => Err(ProtocolError::InvalidPacketType(other)),
    }
}

fn parse_connect(cursor: &mut Cursor<&[u8]>) -> ProtocolResult<Packet> {
    let protocol = read_string(cursor)?;
    if protocol != "MQTT" {
        return Err(ProtocolError::InvalidProtocolName(protocol));
    }
    let level = read_u8_sync(cursor)?;
    if level != 4 {
        return Err(ProtocolError::InvalidProtocolLevel(level));
    }
    let flags = read_u8_sync(cursor)?;
    let keep_alive = read_u16(cursor)?;

    let clean_session = flags & 0x02 != 0;
    let will_flag = flags & 0x04 != 0;
    let will_qos = (flags >> 3) & 0x03;
    let will_retain = flags & 0x20 != 0;
    let has_password = flags & 0x40 != 0;
    let has_username = flags & 0x80 != 0;

    let client_id = read_string(cursor)?;
    let will = if will_flag {
        if will_qos > 2 {
            return Err(ProtocolError::InvalidQoS(will_qos));
        }
        let topic = read_string(cursor)?;
        let payload = read_bytes(cursor)?;
        Some(LastWill {
            topic,
            payload,
            qos: will_qos,
            retain: will_retain,
        })
    } else {
        None
    };
    let username = has_username.then(|| read_string(cursor)).transpose()?;
    let password = has_password.then(|| read_string(cursor)).transpose()?;

    Ok(Packet::Connect(ConnectPacket {
        client_id,
        clean_session,
        keep_alive,
        will,
        username,
        password,
    }))
}

fn parse_publish(flags: u8, cursor: &mut Cursor<&[u8]>, total: usize) -> ProtocolResult<Packet> {
    let dup = flags & 0x08 != 0;
    let qos = (flags >> 1) & 0x03;
    let retain = flags & 0x01 != 0;
    if qos > 2 {
        return Err(ProtocolError::InvalidQoS(qos));
    }
    let topic = read_string(cursor)?;
    let packet_id = if qos > 0 { Some(read_u16(cursor)?) } else { None };
    let consumed = cursor.position() as usize;
    let payload = cursor.get_ref()[consumed..total].to_vec();
    Ok(Packet::Publish(PublishPacket {
        topic,
        payload,
        qos,
        retain,
        dup,
        packet_id,
    }))
}

fn parse_subscribe(cursor: &mut Cursor<&[u8]>, total: usize) -> ProtocolResult<Packet> {
    let packet_id = read_u16(cursor)?;
    let mut filters = Vec::new();
    while (cursor.position() as usize) < total {
        let filter = read_string(cursor)?;
        let qos = read_u8_sync(cursor)?;
        if qos > 2 {
            return Err(ProtocolError::InvalidQoS(qos));
        }
        filters.push((filter, qos));
    }
    if filters.is_empty() {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(Packet::Subscribe { packet_id, filters })
}

fn parse_unsubscribe(cursor: &mut Cursor<&[u8]>, total: usize) -> ProtocolResult<Packet> {
    let packet_id = read_u16(cursor)?;
    let mut filters = Vec::new();
    while (cursor.position() as usize) < total {
        filters.push(read_string(cursor)?);
    }
    if filters.is_empty() {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(Packet::Unsubscribe { packet_id, filters })
}

/// Encode a packet to wire bytes
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let (first, body): (u8, Vec<u8>) = match packet {
        Packet::Connect(connect) => (0x10, encode_connect(connect)),
        Packet::ConnAck {
            session_present,
            code,
        } => (0x20, vec![u8::from(*session_present), *code as u8]),
        Packet::Publish(publish) => {
            let mut flags = (publish.qos.min(2)) << 1;
            if publish.retain {
                flags |= 0x01;
            }
            if publish.dup {
                flags |= 0x08;
            }
            let mut body = Vec::new();
            write_string(&mut body, &publish.topic);
            if publish.qos > 0 {
                body.extend_from_slice(&publish.packet_id.unwrap_or(1).to_be_bytes());
            }
            body.extend_from_slice(&publish.payload);
            (0x30 | flags, body)
        }
        Packet::PubAck { packet_id } => (0x40, packet_id.to_be_bytes().to_vec()),
        Packet::Subscribe { packet_id, filters } => {
            let mut body = packet_id.to_be_bytes().to_vec();
            for (filter, qos) in filters {
                write_string(&mut body, filter);
                body.push(*qos);
            }
            (0x82, body)
        }
        Packet::SubAck {
            packet_id,
            return_codes,
        } => {
            let mut body = packet_id.to_be_bytes().to_vec();
            body.extend_from_slice(return_codes);
            (0x90, body)
        }
        Packet::Unsubscribe { packet_id, filters } => {
            let mut body = packet_id.to_be_bytes().to_vec();
            for filter in filters {
                write_string(&mut body, filter);
            }
            (0xa2, body)
        }
        Packet::UnsubAck { packet_id } => (0xb0, packet_id.to_be_bytes().to_vec()),
        Packet::PingReq => (0xc0, Vec::new()),
        Packet::PingResp => (0xd0, Vec::new()),
        Packet::Disconnect => (0xe0, Vec::new()),
    };

    let mut out = vec![first];
    encode_remaining_length(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

fn encode_connect(connect: &ConnectPacket) -> Vec<u8> {
    let mut body = Vec::new();
    write_string(&mut body, "MQTT");
    body.push(4);
    let mut flags = 0u8;
    if connect.clean_session {
        flags |= 0x02;
    }
    if let Some(will) = &connect.will {
        flags |= 0x04 | (will.qos.min(2) << 3);
        if will.retain {
            flags |= 0x20;
        }
    }
    if connect.password.is_some() {
        flags |= 0x40;
    }
    if connect.username.is_some() {
        flags |= 0x80;
    }
    body.push(flags);
    body.extend_from_slice(&connect.keep_alive.to_be_bytes());
    write_string(&mut body, &connect.client_id);
    if let Some(will) = &connect.will {
        write_string(&mut body, &will.topic);
        body.extend_from_slice(&(will.payload.len() as u16).to_be_bytes());
        body.extend_from_slice(&will.payload);
    }
    if let Some(username) = &connect.username {
        write_string(&mut body, username);
    }
    if let Some(password) = &connect.password {
        write_string(&mut body, password);
    }
    body
}

fn encode_remaining_length(out: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

fn read_u8_sync(cursor: &mut Cursor<&[u8]>) -> ProtocolResult<u8> {
    let mut buf = [0u8; 1];
    Read::read_exact(cursor, &mut buf).map_err(|_| ProtocolError::MalformedPacket)?;
    Ok(buf[0])
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> ProtocolResult<u16> {
    let mut buf = [0u8; 2];
    Read::read_exact(cursor, &mut buf).map_err(|_| ProtocolError::MalformedPacket)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> ProtocolResult<Vec<u8>> {
    let len = read_u16(cursor)? as usize;
    let mut buf = vec![0u8; len];
    Read::read_exact(cursor, &mut buf).map_err(|_| ProtocolError::MalformedPacket)?;
    Ok(buf)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> ProtocolResult<String> {
    let bytes = read_bytes(cursor)?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}
