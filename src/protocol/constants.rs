//! MySQL protocol constants

/// Handshake protocol version accepted from servers
pub const PROTOCOL_VERSION: u8 = 10;

/// Largest payload carried by a single packet; a payload of exactly this size
/// continues in the next packet
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// Max packet size advertised in the handshake response
pub const CLIENT_MAX_PACKET_SIZE: u32 = 16_777_215;

/// utf8mb4_general_ci
pub const DEFAULT_CHARSET: u8 = 45;

/// Collation id of the `binary` character set
pub const BINARY_CHARSET: u16 = 63;

/// Capability flags
pub mod capabilities {
    /// Use the improved old-password algorithm
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    /// Send found rows instead of affected rows
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    /// Longer column flags
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    /// Database name may be sent in the handshake response
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    /// Local infile support
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    /// 4.1 protocol
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    /// Switch to TLS after the SSL request
    pub const CLIENT_SSL: u32 = 1 << 11;
    /// Transaction status flags in OK packets
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    /// 4.1 authentication
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    /// Multiple statements per COM_QUERY
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    /// Multiple result sets
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    /// Multiple result sets from prepared statements
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    /// Pluggable authentication
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    /// Connection attributes
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    /// Length-encoded auth response
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    /// Session state tracking
    pub const CLIENT_SESSION_TRACK: u32 = 1 << 23;
    /// OK packets replace EOF packets
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities the driver always requests (masked by what the server offers)
    pub const CLIENT_BASE: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_LONG_FLAG
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_STATEMENTS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PS_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_DEPRECATE_EOF;
}

/// Command bytes
pub mod commands {
    /// Close the connection
    pub const COM_QUIT: u8 = 0x01;
    /// Text protocol query
    pub const COM_QUERY: u8 = 0x03;
    /// Liveness check
    pub const COM_PING: u8 = 0x0E;
    /// Prepare a statement
    pub const COM_STMT_PREPARE: u8 = 0x16;
    /// Execute a prepared statement
    pub const COM_STMT_EXECUTE: u8 = 0x17;
    /// Deallocate a prepared statement (no response)
    pub const COM_STMT_CLOSE: u8 = 0x19;
}

/// First byte of generic response packets
pub mod headers {
    /// OK packet
    pub const OK: u8 = 0x00;
    /// Auth more-data packet
    pub const AUTH_MORE_DATA: u8 = 0x01;
    /// NULL marker in text rows
    pub const NULL: u8 = 0xFB;
    /// EOF packet, OK packet under DEPRECATE_EOF, or auth switch request
    pub const EOF: u8 = 0xFE;
    /// ERR packet
    pub const ERR: u8 = 0xFF;
}

/// Server status flags
pub mod status {
    /// A transaction is active
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    /// Autocommit is enabled
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    /// More result sets follow
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// caching_sha2_password more-data status bytes
pub mod sha2_status {
    /// Client asks the server for its RSA public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// Scramble matched the server cache
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Full authentication is required
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Column types
pub mod column_types {
    #![allow(missing_docs)]
    pub const DECIMAL: u8 = 0x00;
    pub const TINY: u8 = 0x01;
    pub const SHORT: u8 = 0x02;
    pub const LONG: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const NULL: u8 = 0x06;
    pub const TIMESTAMP: u8 = 0x07;
    pub const LONGLONG: u8 = 0x08;
    pub const INT24: u8 = 0x09;
    pub const DATE: u8 = 0x0A;
    pub const TIME: u8 = 0x0B;
    pub const DATETIME: u8 = 0x0C;
    pub const YEAR: u8 = 0x0D;
    pub const VARCHAR: u8 = 0x0F;
    pub const BIT: u8 = 0x10;
    pub const JSON: u8 = 0xF5;
    pub const NEWDECIMAL: u8 = 0xF6;
    pub const ENUM: u8 = 0xF7;
    pub const SET: u8 = 0xF8;
    pub const TINY_BLOB: u8 = 0xF9;
    pub const MEDIUM_BLOB: u8 = 0xFA;
    pub const LONG_BLOB: u8 = 0xFB;
    pub const BLOB: u8 = 0xFC;
    pub const VAR_STRING: u8 = 0xFD;
    pub const STRING: u8 = 0xFE;
    pub const GEOMETRY: u8 = 0xFF;
}

/// Column definition flags
pub mod column_flags {
    /// Column cannot be NULL
    pub const NOT_NULL: u16 = 0x0001;
    /// Part of the primary key
    pub const PRIMARY_KEY: u16 = 0x0002;
    /// Unsigned numeric column
    pub const UNSIGNED: u16 = 0x0020;
    /// Binary column
    pub const BINARY: u16 = 0x0080;
}
