#![no_main]

use std::io::Read;

use libfuzzer_sys::fuzz_target;
use milli_tls::record::{complete_prefix_len, decode_record_header};
use milli_tls::TransportPair;

fuzz_target!(|data: &[u8]| {
    // Header decode and prefix scan must never panic or overrun
    let whole = complete_prefix_len(data);
    assert!(whole <= data.len());
    if let Some(hdr) = decode_record_header(data) {
        assert!(hdr.record_len() >= 5);
    }

    // Whatever the input, the gate hands every byte over exactly once, in order
    let mut io = TransportPair::new();
    let split = data.first().map(|b| *b as usize % (data.len() + 1)).unwrap_or(0);
    io.push_inbound(&data[..split]);
    io.push_inbound(&data[split..]);
    io.mark_inbound_eof();

    let mut out = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        match io.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    assert_eq!(&out[..], data);
});
