#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use mysql_wire::protocol::constants::capabilities;
use mysql_wire::protocol::decode::{
    decode_auth_response, decode_column_definition, decode_err, decode_ok, decode_prepare_ok,
    decode_text_row,
};

fuzz_target!(|data: &[u8]| {
    let caps = capabilities::CLIENT_BASE;
    let _ = decode_ok(data, caps);
    let _ = decode_err(data);
    let _ = decode_auth_response(data, caps);
    let _ = decode_column_definition(data);
    let _ = decode_prepare_ok(data);

    let payload = Bytes::copy_from_slice(data);
    let _ = decode_text_row(&payload, 4);
});
