//! MySQL client/server protocol
//!
//! This module handles:
//! * Packet framing (3-byte length, sequence id, multi-packet payloads)
//! * Handshake, authentication and command message encoding
//! * Generic response, column definition and row decoding

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{
    decode_auth_response, decode_binary_row, decode_column_count, decode_column_definition,
    decode_eof, decode_err, decode_handshake, decode_ok, decode_packet, decode_prepare_ok,
    decode_text_row, is_end_of_rows, PacketReader,
};
pub use encode::{encode_message, encode_packet};
pub use message::{
    AuthResponse, ColumnDefinition, ErrPacket, FrontendMessage, Handshake, OkPacket, Packet,
    PrepareOk,
};
