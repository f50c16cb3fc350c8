//! Protocol message types

use bytes::Bytes;

/// One logical packet, reassembled from its wire fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence id of the last fragment
    pub sequence: u8,
    /// Payload
    pub payload: Bytes,
}

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Capability frame asking the server to switch to TLS
    SslRequest {
        /// Client capability flags (includes CLIENT_SSL)
        capabilities: u32,
        /// Character set id
        charset: u8,
    },

    /// HandshakeResponse41
    HandshakeResponse {
        /// Client capability flags
        capabilities: u32,
        /// Character set id
        charset: u8,
        /// Principal name
        user: String,
        /// Mechanism-specific auth response
        auth_response: Vec<u8>,
        /// Initial database
        database: Option<String>,
        /// Auth plugin that produced `auth_response`
        plugin: String,
    },

    /// Raw auth data (auth switch response, public key request, full auth)
    AuthData(Vec<u8>),

    /// COM_QUERY
    Query(String),

    /// COM_STMT_PREPARE
    Prepare(String),

    /// COM_STMT_EXECUTE without parameters
    Execute {
        /// Server-side statement id
        statement_id: u32,
    },

    /// COM_STMT_CLOSE
    CloseStatement {
        /// Server-side statement id
        statement_id: u32,
    },

    /// COM_PING
    Ping,

    /// COM_QUIT
    Quit,
}

impl FrontendMessage {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::SslRequest { .. } => "ssl_request",
            FrontendMessage::HandshakeResponse { .. } => "handshake_response",
            FrontendMessage::AuthData(_) => "auth_data",
            FrontendMessage::Query(_) => "com_query",
            FrontendMessage::Prepare(_) => "com_stmt_prepare",
            FrontendMessage::Execute { .. } => "com_stmt_execute",
            FrontendMessage::CloseStatement { .. } => "com_stmt_close",
            FrontendMessage::Ping => "com_ping",
            FrontendMessage::Quit => "com_quit",
        }
    }
}

/// Initial handshake (protocol v10) sent by the server
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Protocol version (always 10)
    pub protocol_version: u8,
    /// Server version string
    pub server_version: String,
    /// Connection (thread) id
    pub connection_id: u32,
    /// Salt, both parts concatenated
    pub auth_plugin_data: Vec<u8>,
    /// Server capability flags
    pub capabilities: u32,
    /// Server default character set
    pub charset: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Default auth plugin
    pub auth_plugin_name: String,
}

/// OK packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    /// Affected rows
    pub affected_rows: u64,
    /// Last insert id
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Warning count
    pub warnings: u16,
    /// Human readable info
    pub info: String,
}

/// ERR packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// MySQL error code
    pub code: u16,
    /// SQLSTATE (`HY000` when the server omitted it)
    pub sql_state: String,
    /// Message
    pub message: String,
}

impl std::fmt::Display for ErrPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.sql_state, self.message)
    }
}

impl From<ErrPacket> for crate::Error {
    fn from(err: ErrPacket) -> Self {
        crate::Error::Server {
            code: err.code,
            sql_state: err.sql_state,
            message: err.message,
        }
    }
}

/// Response during authentication
#[derive(Debug, Clone)]
pub enum AuthResponse {
    /// Authentication succeeded
    Ok(OkPacket),
    /// Authentication rejected
    Err(ErrPacket),
    /// Server asks for a different mechanism
    Switch {
        /// Plugin name
        plugin: String,
        /// New salt
        data: Vec<u8>,
    },
    /// Plugin-specific continuation
    MoreData(Vec<u8>),
}

/// Column definition (Protocol::ColumnDefinition41)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Schema
    pub schema: String,
    /// Virtual table name
    pub table: String,
    /// Physical table name
    pub org_table: String,
    /// Virtual column name
    pub name: String,
    /// Physical column name
    pub org_name: String,
    /// Collation id
    pub charset: u16,
    /// Maximum length
    pub column_length: u32,
    /// Column type
    pub column_type: u8,
    /// Flags
    pub flags: u16,
    /// Decimals
    pub decimals: u8,
}

/// First packet of a COM_STMT_PREPARE response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOk {
    /// Server-side statement id
    pub statement_id: u32,
    /// Number of result columns
    pub num_columns: u16,
    /// Number of parameters
    pub num_params: u16,
    /// Warning count
    pub warnings: u16,
}
