//! Protocol message encoding

use super::constants::{capabilities, commands, MAX_PAYLOAD_LEN};
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a frontend message into a packet payload (without framing)
pub fn encode_message(msg: &FrontendMessage) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();

    match msg {
        FrontendMessage::SslRequest {
            capabilities,
            charset,
        } => {
            encode_ssl_request(&mut buf, *capabilities, *charset);
        }
        FrontendMessage::HandshakeResponse {
            capabilities: caps,
            charset,
            user,
            auth_response,
            database,
            plugin,
        } => {
            buf.put_u32_le(*caps);
            buf.put_u32_le(super::constants::CLIENT_MAX_PACKET_SIZE);
            buf.put_u8(*charset);
            buf.put_bytes(0, 23);
            put_null_terminated(&mut buf, user)?;

            if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
                put_lenenc_bytes(&mut buf, auth_response);
            } else {
                let len = u8::try_from(auth_response.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "auth response too long")
                })?;
                buf.put_u8(len);
                buf.put_slice(auth_response);
            }

            if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
                put_null_terminated(&mut buf, database.as_deref().unwrap_or(""))?;
            }
            if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
                put_null_terminated(&mut buf, plugin)?;
            }
        }
        FrontendMessage::AuthData(data) => {
            buf.put_slice(data);
        }
        FrontendMessage::Query(sql) => {
            buf.put_u8(commands::COM_QUERY);
            buf.put_slice(sql.as_bytes());
        }
        FrontendMessage::Prepare(sql) => {
            buf.put_u8(commands::COM_STMT_PREPARE);
            buf.put_slice(sql.as_bytes());
        }
        FrontendMessage::Execute { statement_id } => {
            buf.put_u8(commands::COM_STMT_EXECUTE);
            buf.put_u32_le(*statement_id);
            // CURSOR_TYPE_NO_CURSOR
            buf.put_u8(0);
            // iteration count, always 1
            buf.put_u32_le(1);
        }
        FrontendMessage::CloseStatement { statement_id } => {
            buf.put_u8(commands::COM_STMT_CLOSE);
            buf.put_u32_le(*statement_id);
        }
        FrontendMessage::Ping => buf.put_u8(commands::COM_PING),
        FrontendMessage::Quit => buf.put_u8(commands::COM_QUIT),
    }

    Ok(buf)
}

fn encode_ssl_request(buf: &mut BytesMut, caps: u32, charset: u8) {
    buf.put_u32_le(caps | capabilities::CLIENT_SSL);
    buf.put_u32_le(super::constants::CLIENT_MAX_PACKET_SIZE);
    buf.put_u8(charset);
    buf.put_bytes(0, 23);
}

/// Frame a payload into one or more packets, advancing `sequence` per fragment.
///
/// A payload whose length is a multiple of the maximum fragment size is
/// terminated by an empty packet.
pub fn encode_packet(out: &mut BytesMut, sequence: &mut u8, payload: &[u8]) {
    let mut chunks = payload.chunks(MAX_PAYLOAD_LEN);
    let mut last_len = 0;
    for chunk in chunks.by_ref() {
        put_header(out, chunk.len(), *sequence);
        out.put_slice(chunk);
        *sequence = sequence.wrapping_add(1);
        last_len = chunk.len();
    }
    if payload.is_empty() || last_len == MAX_PAYLOAD_LEN {
        put_header(out, 0, *sequence);
        *sequence = sequence.wrapping_add(1);
    }
}

fn put_header(out: &mut BytesMut, len: usize, sequence: u8) {
    let len = len as u32;
    out.put_u8((len & 0xFF) as u8);
    out.put_u8(((len >> 8) & 0xFF) as u8);
    out.put_u8(((len >> 16) & 0xFF) as u8);
    out.put_u8(sequence);
}

/// Write a length-encoded integer
pub fn put_lenenc_int(buf: &mut BytesMut, value: u64) {
    match value {
        0..=250 => buf.put_u8(value as u8),
        251..=0xFFFF => {
            buf.put_u8(0xFC);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xFF_FFFF => {
            buf.put_u8(0xFD);
            buf.put_u8((value & 0xFF) as u8);
            buf.put_u8(((value >> 8) & 0xFF) as u8);
            buf.put_u8(((value >> 16) & 0xFF) as u8);
        }
        _ => {
            buf.put_u8(0xFE);
            buf.put_u64_le(value);
        }
    }
}

/// Write a length-encoded byte string
pub fn put_lenenc_bytes(buf: &mut BytesMut, data: &[u8]) {
    put_lenenc_int(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Write a NUL-terminated string; embedded NULs are rejected
pub fn put_null_terminated(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "string contains an embedded NUL byte",
        ));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}
