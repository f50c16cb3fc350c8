#![no_main]

use libfuzzer_sys::fuzz_target;
use mysql_wire::protocol::decode::decode_handshake;

fuzz_target!(|data: &[u8]| {
    if let Ok(handshake) = decode_handshake(data) {
        assert_eq!(handshake.protocol_version, 10);
    }
});
