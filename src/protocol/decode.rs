//! Protocol message decoding

use super::constants::{capabilities, column_types, headers, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
use super::message::{
    AuthResponse, ColumnDefinition, ErrPacket, Handshake, OkPacket, Packet, PrepareOk,
};
use bytes::{Bytes, BytesMut};
use std::io;

/// Maximum reassembled payload (1 GiB), matching the server's `max_allowed_packet` ceiling.
///
/// Packets whose accumulated length exceeds this are rejected before allocation.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string())
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Decode one logical packet from the front of `data`
///
/// Fragments of exactly 0xFFFFFF bytes are joined with the following ones.
/// Nothing is consumed; the caller advances the buffer by the returned count.
///
/// # Returns
/// `Ok((packet, consumed))` - Packet and number of bytes consumed
/// `Err(e)` - `UnexpectedEof` while incomplete, `InvalidData` when oversized
pub fn decode_packet(data: &BytesMut) -> io::Result<(Packet, usize)> {
    let mut offset = 0;
    let mut total = 0;
    let mut fragments: Vec<(usize, usize)> = Vec::with_capacity(1);
    let mut sequence;

    loop {
        if data.len() < offset + 4 {
            return Err(eof("incomplete packet header"));
        }
        let len = data[offset] as usize
            | (data[offset + 1] as usize) << 8
            | (data[offset + 2] as usize) << 16;
        sequence = data[offset + 3];

        total += len;
        if total > MAX_MESSAGE_LENGTH {
            return Err(invalid(format!(
                "packet length {} exceeds maximum allowed {}",
                total, MAX_MESSAGE_LENGTH
            )));
        }

        let start = offset + 4;
        if data.len() < start + len {
            return Err(eof("incomplete packet body"));
        }
        fragments.push((start, start + len));
        offset = start + len;

        if len < MAX_PAYLOAD_LEN {
            break;
        }
    }

    let payload = if fragments.len() == 1 {
        let (start, end) = fragments[0];
        Bytes::copy_from_slice(&data[start..end])
    } else {
        let mut joined = BytesMut::with_capacity(total);
        for (start, end) in fragments {
            joined.extend_from_slice(&data[start..end]);
        }
        joined.freeze()
    };

    Ok((Packet { sequence, payload }, offset))
}

/// Cursor over a packet payload
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Wrap a payload
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Current offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Peek at the next byte
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> io::Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| eof("unexpected end of packet"))?;
        self.pos += 1;
        Ok(b)
    }

    /// Read `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(eof("unexpected end of packet"));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Read everything left
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        out
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> io::Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> io::Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian u64
    pub fn read_u64(&mut self) -> io::Result<u64> {
        let b = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read a NUL-terminated byte string (terminator consumed)
    pub fn read_null_terminated(&mut self) -> io::Result<&'a [u8]> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid("missing null terminator in string"))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    /// Read a NUL-terminated string, or the rest of the payload when unterminated
    pub fn read_null_terminated_or_rest(&mut self) -> &'a [u8] {
        match self.read_null_terminated() {
            Ok(s) => s,
            Err(_) => self.read_rest(),
        }
    }

    /// Read a length-encoded integer; `None` for the 0xFB NULL marker
    pub fn read_lenenc_int_or_null(&mut self) -> io::Result<Option<u64>> {
        let first = self.read_u8()?;
        let value = match first {
            0..=250 => u64::from(first),
            headers::NULL => return Ok(None),
            0xFC => u64::from(self.read_u16()?),
            0xFD => {
                let b = self.read_bytes(3)?;
                u64::from(b[0]) | u64::from(b[1]) << 8 | u64::from(b[2]) << 16
            }
            0xFE => self.read_u64()?,
            _ => {
                return Err(invalid(format!(
                    "invalid length-encoded integer prefix: 0x{:02X}",
                    first
                )))
            }
        };
        Ok(Some(value))
    }

    /// Read a length-encoded integer
    pub fn read_lenenc_int(&mut self) -> io::Result<u64> {
        self.read_lenenc_int_or_null()?
            .ok_or_else(|| invalid("unexpected NULL length-encoded integer"))
    }

    /// Read a length-encoded byte string
    pub fn read_lenenc_bytes(&mut self) -> io::Result<&'a [u8]> {
        let len = self.read_lenenc_int()?;
        let len = usize::try_from(len).map_err(|_| invalid("length-encoded string too long"))?;
        self.read_bytes(len)
    }

    fn read_lenenc_string(&mut self) -> io::Result<String> {
        Ok(String::from_utf8_lossy(self.read_lenenc_bytes()?).into_owned())
    }
}

/// Decode the server's initial handshake (protocol v10)
pub fn decode_handshake(payload: &[u8]) -> io::Result<Handshake> {
    let mut r = PacketReader::new(payload);

    let protocol_version = r.read_u8()?;
    if protocol_version == headers::ERR {
        let err = decode_err(payload)?;
        return Err(invalid(format!("server refused connection: {}", err)));
    }
    if protocol_version != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported protocol version: {}", protocol_version),
        ));
    }

    let server_version = String::from_utf8_lossy(r.read_null_terminated()?).into_owned();
    let connection_id = r.read_u32()?;
    let mut auth_plugin_data = r.read_bytes(8)?.to_vec();
    let _filler = r.read_u8()?;
    let cap_lower = r.read_u16()?;

    // Pre-4.1 servers may end the greeting here
    if r.remaining() == 0 {
        return Ok(Handshake {
            protocol_version,
            server_version,
            connection_id,
            auth_plugin_data,
            capabilities: u32::from(cap_lower),
            charset: super::constants::DEFAULT_CHARSET,
            status_flags: 0,
            auth_plugin_name: crate::auth::MYSQL_NATIVE_PASSWORD.to_string(),
        });
    }

    let charset = r.read_u8()?;
    let status_flags = r.read_u16()?;
    let cap_upper = r.read_u16()?;
    let caps = u32::from(cap_lower) | u32::from(cap_upper) << 16;
    let auth_data_len = r.read_u8()?;
    let _reserved = r.read_bytes(10)?;

    if caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
        let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8)) as usize;
        let part2 = r.read_bytes(part2_len.min(r.remaining()))?;
        let trimmed = part2.strip_suffix(&[0]).unwrap_or(part2);
        auth_plugin_data.extend_from_slice(trimmed);
    }

    let auth_plugin_name = if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 && r.remaining() > 0 {
        String::from_utf8_lossy(r.read_null_terminated_or_rest()).into_owned()
    } else {
        crate::auth::MYSQL_NATIVE_PASSWORD.to_string()
    };

    Ok(Handshake {
        protocol_version,
        server_version,
        connection_id,
        auth_plugin_data,
        capabilities: caps,
        charset,
        status_flags,
        auth_plugin_name,
    })
}

/// Decode an OK packet (header 0x00, or 0xFE under CLIENT_DEPRECATE_EOF)
pub fn decode_ok(payload: &[u8], caps: u32) -> io::Result<OkPacket> {
    let mut r = PacketReader::new(payload);
    let header = r.read_u8()?;
    if header != headers::OK && header != headers::EOF {
        return Err(invalid(format!("expected OK packet, got 0x{:02X}", header)));
    }

    let affected_rows = r.read_lenenc_int()?;
    let last_insert_id = r.read_lenenc_int()?;
    let (status_flags, warnings) = if caps & capabilities::CLIENT_PROTOCOL_41 != 0 {
        (r.read_u16()?, r.read_u16()?)
    } else if caps & capabilities::CLIENT_TRANSACTIONS != 0 {
        (r.read_u16()?, 0)
    } else {
        (0, 0)
    };
    let info = String::from_utf8_lossy(r.read_rest()).into_owned();

    Ok(OkPacket {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings,
        info,
    })
}

/// Decode a legacy EOF packet into (warnings, status flags)
pub fn decode_eof(payload: &[u8]) -> io::Result<(u16, u16)> {
    let mut r = PacketReader::new(payload);
    let header = r.read_u8()?;
    if header != headers::EOF {
        return Err(invalid(format!("expected EOF packet, got 0x{:02X}", header)));
    }
    if r.remaining() < 4 {
        return Ok((0, 0));
    }
    Ok((r.read_u16()?, r.read_u16()?))
}

/// Decode an ERR packet
pub fn decode_err(payload: &[u8]) -> io::Result<ErrPacket> {
    let mut r = PacketReader::new(payload);
    let header = r.read_u8()?;
    if header != headers::ERR {
        return Err(invalid(format!("expected ERR packet, got 0x{:02X}", header)));
    }
    let code = r.read_u16()?;
    let sql_state = if r.peek() == Some(b'#') {
        r.read_u8()?;
        String::from_utf8_lossy(r.read_bytes(5)?).into_owned()
    } else {
        "HY000".to_string()
    };
    let message = String::from_utf8_lossy(r.read_rest()).into_owned();
    Ok(ErrPacket {
        code,
        sql_state,
        message,
    })
}

/// Whether a payload terminates a row sequence
///
/// Under CLIENT_DEPRECATE_EOF the terminator is an OK packet with a 0xFE
/// header; a row can also start with 0xFE when its first value is large, so
/// the length disambiguates.
pub fn is_end_of_rows(payload: &[u8], caps: u32) -> bool {
    match payload.first() {
        Some(&headers::EOF) => {
            if caps & capabilities::CLIENT_DEPRECATE_EOF != 0 {
                payload.len() < MAX_PAYLOAD_LEN
            } else {
                payload.len() < 9
            }
        }
        _ => false,
    }
}

/// Decode a response received while authenticating
pub fn decode_auth_response(payload: &[u8], caps: u32) -> io::Result<AuthResponse> {
    match payload.first() {
        Some(&headers::OK) => Ok(AuthResponse::Ok(decode_ok(payload, caps)?)),
        Some(&headers::ERR) => Ok(AuthResponse::Err(decode_err(payload)?)),
        Some(&headers::EOF) => {
            let mut r = PacketReader::new(&payload[1..]);
            if r.remaining() == 0 {
                // Old auth switch request, no plugin name
                return Ok(AuthResponse::Switch {
                    plugin: "mysql_old_password".to_string(),
                    data: Vec::new(),
                });
            }
            let plugin = String::from_utf8_lossy(r.read_null_terminated_or_rest()).into_owned();
            let data = r.read_rest();
            let data = data.strip_suffix(&[0]).unwrap_or(data).to_vec();
            Ok(AuthResponse::Switch { plugin, data })
        }
        Some(&headers::AUTH_MORE_DATA) => Ok(AuthResponse::MoreData(payload[1..].to_vec())),
        Some(other) => Err(invalid(format!(
            "unexpected authentication response: 0x{:02X}",
            other
        ))),
        None => Err(invalid("empty authentication response")),
    }
}

/// Decode the column count that opens a result set
pub fn decode_column_count(payload: &[u8]) -> io::Result<u64> {
    PacketReader::new(payload).read_lenenc_int()
}

/// Decode a column definition
pub fn decode_column_definition(payload: &[u8]) -> io::Result<ColumnDefinition> {
    let mut r = PacketReader::new(payload);
    let _catalog = r.read_lenenc_bytes()?;
    let schema = r.read_lenenc_string()?;
    let table = r.read_lenenc_string()?;
    let org_table = r.read_lenenc_string()?;
    let name = r.read_lenenc_string()?;
    let org_name = r.read_lenenc_string()?;
    let _fixed_len = r.read_lenenc_int()?;
    let charset = r.read_u16()?;
    let column_length = r.read_u32()?;
    let column_type = r.read_u8()?;
    let flags = r.read_u16()?;
    let decimals = r.read_u8()?;

    Ok(ColumnDefinition {
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        column_length,
        column_type,
        flags,
        decimals,
    })
}

/// Decode the first packet of a COM_STMT_PREPARE response
pub fn decode_prepare_ok(payload: &[u8]) -> io::Result<PrepareOk> {
    let mut r = PacketReader::new(payload);
    let header = r.read_u8()?;
    if header != headers::OK {
        return Err(invalid(format!(
            "expected prepare OK packet, got 0x{:02X}",
            header
        )));
    }
    let statement_id = r.read_u32()?;
    let num_columns = r.read_u16()?;
    let num_params = r.read_u16()?;
    let _filler = r.read_u8()?;
    let warnings = if r.remaining() >= 2 { r.read_u16()? } else { 0 };

    Ok(PrepareOk {
        statement_id,
        num_columns,
        num_params,
        warnings,
    })
}

/// Split a text-protocol row into raw column values (`None` for NULL)
pub fn decode_text_row(payload: &Bytes, columns: usize) -> io::Result<Vec<Option<Bytes>>> {
    let mut r = PacketReader::new(payload);
    let mut values = Vec::with_capacity(columns);
    for _ in 0..columns {
        match r.read_lenenc_int_or_null()? {
            None => values.push(None),
            Some(len) => {
                let len = usize::try_from(len).map_err(|_| invalid("value too long"))?;
                let start = r.position();
                r.read_bytes(len)?;
                values.push(Some(payload.slice(start..start + len)));
            }
        }
    }
    if r.remaining() != 0 {
        return Err(invalid("trailing bytes after text row"));
    }
    Ok(values)
}

/// Split a binary-protocol row into raw column values (`None` for NULL)
///
/// Temporal values are returned without their length prefix; the slice
/// length carries it.
pub fn decode_binary_row(payload: &Bytes, column_types: &[u8]) -> io::Result<Vec<Option<Bytes>>> {
    let mut r = PacketReader::new(payload);
    let header = r.read_u8()?;
    if header != headers::OK {
        return Err(invalid(format!(
            "expected binary row header 0x00, got 0x{:02X}",
            header
        )));
    }
    let bitmap = r.read_bytes((column_types.len() + 7 + 2) / 8)?;

    let mut values = Vec::with_capacity(column_types.len());
    for (i, &column_type) in column_types.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(None);
            continue;
        }
        let (start, len) = match column_type {
            column_types::NULL => (r.position(), 0),
            column_types::TINY => (r.position(), 1),
            column_types::SHORT | column_types::YEAR => (r.position(), 2),
            column_types::LONG | column_types::INT24 | column_types::FLOAT => (r.position(), 4),
            column_types::LONGLONG | column_types::DOUBLE => (r.position(), 8),
            column_types::DATE
            | column_types::DATETIME
            | column_types::TIMESTAMP
            | column_types::TIME => {
                let len = r.read_u8()? as usize;
                (r.position(), len)
            }
            _ => {
                let len = r.read_lenenc_int()?;
                let len = usize::try_from(len).map_err(|_| invalid("value too long"))?;
                (r.position(), len)
            }
        };
        r.read_bytes(len)?;
        values.push(Some(payload.slice(start..start + len)));
    }
    Ok(values)
}
