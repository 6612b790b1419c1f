#![no_main]

use libfuzzer_sys::fuzz_target;
use tictactoe_arbiter::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    // Untrusted input on the server side: parsing must never panic, and
    // anything that parses must survive re-encoding.
    if let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) {
        let json = serde_json::to_string(&msg).expect("re-encode");
        let again: ClientMessage = serde_json::from_str(&json).expect("re-decode");
        assert_eq!(msg, again);
    }
});
