#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Game-flow tests against the store, the arbiter and the server dispatch.
//!
//! Everything here runs in-process: connections are registered on the
//! server's hub and their outbound queues are read directly.

mod common;

use std::sync::Arc;

use tictactoe_arbiter::arbiter::{submit_move, MoveRejection};
use tictactoe_arbiter::board::{Board, Cell, Evaluation, Symbol};
use tictactoe_arbiter::protocol::{ClientMessage, ConnectionId, GameResult, ServerMessage};
use tictactoe_arbiter::session::{Outcome, SessionStatus, SessionStore};
use tictactoe_arbiter::{ErrorCode, GameServer};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

struct Player {
    id: ConnectionId,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Player {
    fn connect(server: &GameServer) -> Self {
        let (id, rx) = server.connect();
        Self { id, rx }
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

async fn join(server: &GameServer, player: &Player, room: &str) {
    server
        .handle(
            player.id,
            ClientMessage::JoinRoom {
                room_id: room.into(),
                player_name: None,
            },
        )
        .await;
}

async fn play(server: &GameServer, player: &Player, row: usize, col: usize) {
    server
        .handle(player.id, ClientMessage::SubmitMove { row, col })
        .await;
}

/// Two players seated in `room` with the start messages drained.
async fn active_room(server: &GameServer, room: &str) -> (Player, Player) {
    let mut a = Player::connect(server);
    let mut b = Player::connect(server);
    join(server, &a, room).await;
    join(server, &b, room).await;
    a.drain();
    b.drain();
    (a, b)
}

fn board(rows: [[Option<Symbol>; 3]; 3]) -> Board {
    let mut board = Board::new();
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let Some(symbol) = cell {
                board = board.place(r, c, *symbol).unwrap();
            }
        }
    }
    board
}

const X: Option<Symbol> = Some(Symbol::X);
const O: Option<Symbol> = Some(Symbol::O);
const E: Option<Symbol> = None;

// ════════════════════════════════════════════════════════════════════
// Win scenario in room R1
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn r1_win_scenario() {
    common::init_tracing();
    let server = GameServer::default();
    let mut a = Player::connect(&server);
    let mut b = Player::connect(&server);

    join(&server, &a, "R1").await;
    let session = server.store().snapshot("R1").await.unwrap();
    assert_eq!(session.status(), SessionStatus::Waiting);

    join(&server, &b, "R1").await;
    let session = server.store().snapshot("R1").await.unwrap();
    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(session.symbol_of(a.id), Some(Symbol::X));
    assert_eq!(session.symbol_of(b.id), Some(Symbol::O));
    assert_eq!(session.turn_owner(), Some(a.id));
    a.drain();
    b.drain();

    // A plays (0,0); both see the same board with B to move.
    play(&server, &a, 0, 0).await;
    let expected = ServerMessage::MoveUpdate {
        board: board([[X, E, E], [E, E, E], [E, E, E]]),
        turn_owner: b.id,
    };
    assert_eq!(a.drain(), vec![expected.clone()]);
    assert_eq!(b.drain(), vec![expected]);

    // B targets the occupied cell: rejected to B only, nothing changes.
    let before = server.store().snapshot("R1").await.unwrap();
    play(&server, &b, 0, 0).await;
    assert!(matches!(
        b.drain().as_slice(),
        [ServerMessage::MoveRejected {
            error_code: ErrorCode::CellOccupied,
            ..
        }]
    ));
    assert!(a.drain().is_empty());
    let after = server.store().snapshot("R1").await.unwrap();
    assert_eq!(after.board(), before.board());
    assert_eq!(after.turn_owner(), before.turn_owner());

    play(&server, &b, 1, 1).await;
    play(&server, &a, 0, 1).await;
    play(&server, &b, 2, 2).await;
    a.drain();
    b.drain();

    // X completes row 0.
    play(&server, &a, 0, 2).await;
    let final_board = board([[X, X, X], [E, O, E], [E, E, O]]);
    assert_eq!(
        a.drain(),
        vec![ServerMessage::GameEnded {
            result: GameResult::Won,
            board: final_board
        }]
    );
    assert_eq!(
        b.drain(),
        vec![ServerMessage::GameEnded {
            result: GameResult::Lost,
            board: final_board
        }]
    );

    let session = server.store().snapshot("R1").await.unwrap();
    assert_eq!(session.status(), SessionStatus::Finished);
    assert_eq!(session.outcome(), Some(Outcome::WinFor(Symbol::X)));

    // Frozen: further moves are NotActive.
    play(&server, &b, 2, 0).await;
    assert!(matches!(
        b.drain().as_slice(),
        [ServerMessage::MoveRejected {
            error_code: ErrorCode::NotActive,
            ..
        }]
    ));
}

// ════════════════════════════════════════════════════════════════════
// Draw
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_board_without_line_is_draw_for_both() {
    let server = GameServer::default();
    let (mut a, mut b) = active_room(&server, "draw").await;

    let moves = [
        (0, 0),
        (0, 1),
        (0, 2),
        (1, 1),
        (1, 0),
        (1, 2),
        (2, 1),
        (2, 0),
        (2, 2),
    ];
    for (i, (row, col)) in moves.into_iter().enumerate() {
        let mover = if i % 2 == 0 { &a } else { &b };
        play(&server, mover, row, col).await;
    }

    let expected_board = board([[X, O, X], [X, O, O], [O, X, X]]);
    assert_eq!(expected_board.evaluate(), Evaluation::Draw);
    for player in [&mut a, &mut b] {
        assert_eq!(
            player.drain().last(),
            Some(&ServerMessage::GameEnded {
                result: GameResult::Draw,
                board: expected_board
            })
        );
    }
    let session = server.store().snapshot("draw").await.unwrap();
    assert_eq!(session.outcome(), Some(Outcome::Draw));
}

// ════════════════════════════════════════════════════════════════════
// Turn ownership
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn turn_owner_alternates_after_every_accepted_move() {
    let store = SessionStore::new();
    let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
    store.join("T", a, "A").await.unwrap();
    store.join("T", b, "B").await.unwrap();

    let cells = [(1, 1), (0, 0), (2, 2), (0, 2), (0, 1)];
    let mut mover = a;
    for (row, col) in cells {
        let accepted = submit_move(&store, "T", mover, row, col).await.unwrap();
        let other = if mover == a { b } else { a };
        assert_eq!(accepted.turn_owner, other);
        mover = other;
    }
}

#[tokio::test]
async fn out_of_turn_move_is_rejected_to_sender_only() {
    let server = GameServer::default();
    let (mut a, mut b) = active_room(&server, "R").await;

    play(&server, &b, 1, 1).await;
    assert!(matches!(
        b.drain().as_slice(),
        [ServerMessage::MoveRejected {
            error_code: ErrorCode::NotYourTurn,
            ..
        }]
    ));
    assert!(a.drain().is_empty());

    play(&server, &a, 3, 0).await;
    assert!(matches!(
        a.drain().as_slice(),
        [ServerMessage::MoveRejected {
            error_code: ErrorCode::OutOfBounds,
            ..
        }]
    ));
    let session = server.store().snapshot("R").await.unwrap();
    assert_eq!(session.board(), &Board::new());
    assert_eq!(session.turn_owner(), Some(a.id));
}

#[tokio::test]
async fn move_before_opponent_arrives_is_not_active() {
    let server = GameServer::default();
    let mut a = Player::connect(&server);
    join(&server, &a, "lonely").await;
    a.drain();

    play(&server, &a, 0, 0).await;
    assert!(matches!(
        a.drain().as_slice(),
        [ServerMessage::MoveRejected {
            error_code: ErrorCode::NotActive,
            ..
        }]
    ));
}

// ════════════════════════════════════════════════════════════════════
// Room capacity
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn third_join_gets_room_full() {
    let server = GameServer::default();
    let (mut a, mut b) = active_room(&server, "R1").await;
    let before = server.store().snapshot("R1").await.unwrap();

    let mut c = Player::connect(&server);
    join(&server, &c, "R1").await;
    assert!(matches!(
        c.drain().as_slice(),
        [ServerMessage::RoomJoinError {
            error_code: ErrorCode::RoomFull,
            ..
        }]
    ));
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());

    let after = server.store().snapshot("R1").await.unwrap();
    assert_eq!(after.participants(), before.participants());
    assert_eq!(after.status(), SessionStatus::Active);
    assert_eq!(server.store().room_of(c.id).await, None);
}

#[tokio::test]
async fn joining_twice_is_already_in_room() {
    let server = GameServer::default();
    let mut a = Player::connect(&server);
    join(&server, &a, "R1").await;
    join(&server, &a, "R2").await;
    let messages = a.drain();
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::RoomJoinError {
            error_code: ErrorCode::AlreadyInRoom,
            ..
        })
    ));
}

// ════════════════════════════════════════════════════════════════════
// Departures
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn disconnect_mid_game_notifies_peer_and_removes_session() {
    let server = GameServer::default();
    let (a, mut b) = active_room(&server, "R1").await;
    play(&server, &a, 0, 0).await;
    b.drain();

    server.disconnect(a.id).await;
    assert_eq!(b.drain(), vec![ServerMessage::OpponentLeft]);
    assert!(server.store().get("R1").await.is_none());

    let err = submit_move(server.store(), "R1", b.id, 1, 1)
        .await
        .unwrap_err();
    assert_eq!(err, MoveRejection::NoSuchRoom);

    play(&server, &b, 1, 1).await;
    assert!(matches!(
        b.drain().as_slice(),
        [ServerMessage::MoveRejected {
            error_code: ErrorCode::NoSuchRoom,
            ..
        }]
    ));
}

#[tokio::test]
async fn disconnect_while_waiting_frees_room_id() {
    let server = GameServer::default();
    let a = Player::connect(&server);
    join(&server, &a, "R1").await;
    server.disconnect(a.id).await;
    assert!(server.store().is_empty().await);

    let mut c = Player::connect(&server);
    join(&server, &c, "R1").await;
    assert!(matches!(
        c.drain().as_slice(),
        [ServerMessage::RoomJoined { .. }]
    ));
}

#[tokio::test]
async fn disconnect_after_finish_acknowledges_and_still_notifies() {
    let server = GameServer::default();
    let (a, mut b) = active_room(&server, "R1").await;
    for (p, row, col) in [(&a, 0, 0), (&b, 1, 0), (&a, 0, 1), (&b, 1, 1), (&a, 0, 2)] {
        play(&server, p, row, col).await;
    }
    b.drain();

    server.disconnect(a.id).await;
    assert_eq!(b.drain(), vec![ServerMessage::OpponentLeft]);
    assert!(server.store().is_empty().await);
    assert_eq!(server.store().room_of(b.id).await, None);
}

// ════════════════════════════════════════════════════════════════════
// Concurrency
// ════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_moves_from_turn_owner_accept_exactly_one() {
    let store = Arc::new(SessionStore::new());
    let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
    store.join("race", a, "A").await.unwrap();
    store.join("race", b, "B").await.unwrap();

    let mut tasks = Vec::new();
    for cell in 0..9 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            submit_move(&store, "race", a, cell / 3, cell % 3).await
        }));
    }
    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(rejection) => assert_eq!(rejection, MoveRejection::NotYourTurn),
        }
    }
    assert_eq!(accepted, 1);

    let session = store.snapshot("race").await.unwrap();
    assert_eq!(session.board().marks(), 1);
    assert_eq!(session.turn_owner(), Some(b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_rooms_play_in_parallel() {
    let server = GameServer::default();
    let mut tasks = Vec::new();
    for n in 0..16 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            let room = format!("room-{n}");
            let (mut a, mut b) = active_room(&server, &room).await;
            for (i, (row, col)) in [(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]
                .into_iter()
                .enumerate()
            {
                let mover = if i % 2 == 0 { &a } else { &b };
                play(&server, mover, row, col).await;
            }
            let last_a = a.drain().pop();
            let last_b = b.drain().pop();
            (last_a, last_b)
        }));
    }
    for task in tasks {
        let (a, b) = task.await.unwrap();
        assert!(matches!(
            a,
            Some(ServerMessage::GameEnded {
                result: GameResult::Won,
                ..
            })
        ));
        assert!(matches!(
            b,
            Some(ServerMessage::GameEnded {
                result: GameResult::Lost,
                ..
            })
        ));
    }
    assert_eq!(server.store().len().await, 16);
}

#[tokio::test]
async fn board_cells_reflect_moves() {
    let server = GameServer::default();
    let (a, b) = active_room(&server, "cells").await;
    play(&server, &a, 2, 1).await;
    play(&server, &b, 0, 2).await;
    let session = server.store().snapshot("cells").await.unwrap();
    assert_eq!(session.board().cell(2, 1), Some(Cell::Taken(Symbol::X)));
    assert_eq!(session.board().cell(0, 2), Some(Cell::Taken(Symbol::O)));
    assert_eq!(session.board().cell(1, 1), Some(Cell::Empty));
}
