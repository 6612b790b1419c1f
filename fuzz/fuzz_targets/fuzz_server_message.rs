#![no_main]

use libfuzzer_sys::fuzz_target;
use tictactoe_arbiter::protocol::ServerMessage;
use tictactoe_arbiter::reconciler::Reconciler;

fuzz_target!(|data: &[u8]| {
    // Whatever a server sends, the client cache must absorb it.
    if let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&msg);
        let _ = reconciler.try_move(1, 1);
    }
});
