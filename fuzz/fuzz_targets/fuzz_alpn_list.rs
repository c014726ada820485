#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_tls::alpn::{encode, negotiate_wire, ProtocolList, SelectionOrder};

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary offers should never panic
    let Ok(list) = ProtocolList::parse(data) else {
        return;
    };
    let ids: Vec<&[u8]> = list.iter().collect();
    // A valid list re-encodes to the same bytes
    assert_eq!(encode(&ids), data);

    let supported: [&[u8]; 2] = [b"h2", b"http/1.1"];
    for order in [SelectionOrder::ServerPreference, SelectionOrder::ClientPreference] {
        let got = negotiate_wire(data, &supported, order).unwrap();
        if let Some(p) = got.selected() {
            assert!(supported.contains(&p));
            assert!(ids.contains(&p));
        }
    }
});
