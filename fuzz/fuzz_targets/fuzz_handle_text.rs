#![no_main]

use libfuzzer_sys::fuzz_target;
use tictactoe_arbiter::GameServer;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let server = GameServer::default();
        let (a, mut rx_a) = server.connect();
        let (b, _rx_b) = server.connect();
        for (i, line) in text.lines().enumerate() {
            let who = if i % 2 == 0 { a } else { b };
            server.handle_text(who, line).await;
        }
        // Every request gets at most a bounded number of replies.
        let mut replies = 0usize;
        while rx_a.try_recv().is_ok() {
            replies += 1;
        }
        assert!(replies <= 2 * text.lines().count());
    });
});
