#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use mysql_wire::protocol::decode::decode_packet;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several packets may arrive in a single TCP segment.
    loop {
        if buf.is_empty() {
            break;
        }
        match decode_packet(&buf) {
            Ok((packet, consumed)) => {
                assert!(packet.payload.len() < consumed);
                let _ = buf.split_to(consumed);
            }
            Err(_) => break,
        }
    }
});
