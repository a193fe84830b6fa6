//! End-to-end door scenarios: Wiegand edges in, relay/LED/buzzer out.
//!
//! Every test drives the reader and exit button the way their ISRs would
//! and advances the millisecond tick, so timing is checked against the
//! real sequencer rather than mocked.

use doorctl::app::events::AppEvent;
use doorctl::config::{DEFAULT_OPEN_TIME_MS, DoorConfig, IDLE_TIMEOUT_MS};
use doorctl::drivers::wiegand::{KEY_ENTER, KEY_ESC, Line};
use doorctl::fsm::states::{DoorState, pack_pin};
use doorctl::store::{AccessKind, AccessStore};
use doorctl::ReaderFault;

use super::mock_hw::{Board, Eeprom, TestController};

fn transitions(ctl: &TestController<'_>) -> Vec<(&'static str, &'static str)> {
    ctl.sink()
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::DoorStateChanged { from, to, .. } => Some((from.name(), to.name())),
            _ => None,
        })
        .collect()
}

fn state(ctl: &TestController<'_>) -> DoorState {
    ctl.door(0).unwrap().state()
}

fn enter_pin(board: &Board, ctl: &mut TestController<'_>, digits: &[u8]) {
    for &d in digits {
        board.key(ctl, d);
    }
}

fn with_pin_1234(board: &Board) -> TestController<'_> {
    let mut ctl = board.controller(Eeprom::new());
    ctl.store_mut()
        .set_access(AccessKind::Pin, pack_pin(&[1, 2, 3, 4]), 0b0001)
        .unwrap();
    ctl
}

// ── PIN entry ────────────────────────────────────────────────

#[test]
fn matching_pin_opens_for_configured_time() {
    let board = Board::new();
    let mut ctl = with_pin_1234(&board);

    enter_pin(&board, &mut ctl, &[1, 2, 3, 4]);
    assert_eq!(state(&ctl), DoorState::ReadingPin { pin: 0xFFFF_1234 });
    assert!(!board.relay.is_high());

    board.key(&mut ctl, KEY_ENTER);
    assert_eq!(state(&ctl), DoorState::Opening);
    assert!(board.relay.is_high(), "strike must be energized");
    assert!(board.led.is_high());

    board.advance(&mut ctl, u32::from(DEFAULT_OPEN_TIME_MS) - 10);
    assert!(board.relay.is_high(), "released before the open time");

    board.advance(&mut ctl, 20);
    assert!(!board.relay.is_high());
    assert!(!board.led.is_high());
    assert_eq!(state(&ctl), DoorState::Idle);
    assert_eq!(board.relay.activations(), 1);

    assert_eq!(
        transitions(&ctl),
        vec![
            ("Idle", "ReadingPin"),
            ("ReadingPin", "Opening"),
            ("Opening", "Idle")
        ]
    );
}

#[test]
fn granted_pin_is_marked_used() {
    let board = Board::new();
    let mut ctl = with_pin_1234(&board);
    let key = pack_pin(&[1, 2, 3, 4]);
    let (_, before) = ctl.store().find(AccessKind::Pin, key).unwrap().unwrap();
    assert!(!before.used);

    enter_pin(&board, &mut ctl, &[1, 2, 3, 4, KEY_ENTER]);

    let (_, after) = ctl.store().find(AccessKind::Pin, key).unwrap().unwrap();
    assert!(after.used);
}

#[test]
fn wrong_pin_rejects_then_returns_to_idle() {
    let board = Board::new();
    let mut ctl = with_pin_1234(&board);

    enter_pin(&board, &mut ctl, &[1, 2, 3, 5, KEY_ENTER]);
    assert_eq!(state(&ctl), DoorState::Rejected);
    assert!(board.buzzer.is_high());

    // Rejection pattern runs 2.4 s in total.
    board.advance(&mut ctl, 2380);
    assert_eq!(state(&ctl), DoorState::Rejected);
    board.advance(&mut ctl, 40);
    assert_eq!(state(&ctl), DoorState::Idle);
    assert!(!board.buzzer.is_high());

    assert_eq!(board.relay.activations(), 0, "unlock must never assert");
    assert_eq!(
        transitions(&ctl),
        vec![
            ("Idle", "ReadingPin"),
            ("ReadingPin", "Rejected"),
            ("Rejected", "Idle")
        ]
    );
}

#[test]
fn abandoned_pin_times_out() {
    let board = Board::new();
    let mut ctl = with_pin_1234(&board);

    enter_pin(&board, &mut ctl, &[1, 2]);
    board.advance(&mut ctl, u32::from(IDLE_TIMEOUT_MS) - 10);
    assert!(matches!(state(&ctl), DoorState::ReadingPin { .. }));

    board.advance(&mut ctl, 20);
    assert_eq!(state(&ctl), DoorState::Timeout);

    board.advance(&mut ctl, 1000);
    assert_eq!(state(&ctl), DoorState::Idle);
    assert_eq!(board.relay.activations(), 0);
    assert!(!transitions(&ctl).iter().any(|&(_, to)| to == "Opening"));
}

#[test]
fn each_digit_rearms_the_idle_timer() {
    let board = Board::new();
    let mut ctl = with_pin_1234(&board);

    board.key(&mut ctl, 1);
    board.advance(&mut ctl, u32::from(IDLE_TIMEOUT_MS) - 100);
    board.key(&mut ctl, 2);
    board.advance(&mut ctl, u32::from(IDLE_TIMEOUT_MS) - 100);
    assert!(matches!(state(&ctl), DoorState::ReadingPin { .. }));

    enter_pin(&board, &mut ctl, &[3, 4, KEY_ENTER]);
    assert_eq!(state(&ctl), DoorState::Opening);
}

#[test]
fn star_key_is_part_of_the_pin() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());
    ctl.store_mut()
        .set_access(AccessKind::Pin, pack_pin(&[1, KEY_ESC]), 0b0001)
        .unwrap();

    enter_pin(&board, &mut ctl, &[1, KEY_ESC]);
    assert_eq!(state(&ctl), DoorState::ReadingPin { pin: 0xFFFF_FF1A });

    board.key(&mut ctl, KEY_ENTER);
    assert_eq!(state(&ctl), DoorState::Opening);
    assert!(board.relay.is_high());
}

#[test]
fn enter_without_pin_is_an_error() {
    let board = Board::new();
    let mut ctl = with_pin_1234(&board);

    board.key(&mut ctl, KEY_ENTER);
    assert_eq!(state(&ctl), DoorState::Error);
    board.advance(&mut ctl, 420);
    assert_eq!(state(&ctl), DoorState::Idle);
    assert_eq!(board.relay.activations(), 0);
}

// ── Cards ────────────────────────────────────────────────────

#[test]
fn granted_card_opens_from_idle() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());
    ctl.store_mut()
        .set_access(AccessKind::Card, 0x00AB_CDEF, 0b0001)
        .unwrap();

    board.card(&mut ctl, 0x00AB_CDEF);
    assert_eq!(state(&ctl), DoorState::Opening);
    assert!(board.relay.is_high());
    assert_eq!(transitions(&ctl), vec![("Idle", "Opening")]);
}

#[test]
fn card_for_another_door_is_rejected() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());
    ctl.store_mut()
        .set_access(AccessKind::Card, 42, 0b0010)
        .unwrap();

    board.card(&mut ctl, 42);
    assert_eq!(state(&ctl), DoorState::Rejected);
    assert_eq!(board.relay.activations(), 0);
}

#[test]
fn unknown_card_is_rejected() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());

    board.card(&mut ctl, 7);
    assert_eq!(state(&ctl), DoorState::Rejected);
}

#[test]
fn card_during_pin_entry_is_an_error() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());
    ctl.store_mut()
        .set_access(AccessKind::Card, 99, 0b0001)
        .unwrap();

    board.key(&mut ctl, 1);
    board.card(&mut ctl, 99);
    assert_eq!(state(&ctl), DoorState::Error);
    assert_eq!(board.relay.activations(), 0);
}

// ── Exit button ──────────────────────────────────────────────

#[test]
fn exit_button_opens_without_credential() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());

    board.press_exit(&mut ctl);
    assert_eq!(state(&ctl), DoorState::Opening);
    assert!(board.relay.is_high());

    board.release_exit(&mut ctl);
    assert_eq!(state(&ctl), DoorState::Opening);
    assert_eq!(board.relay.activations(), 1);
}

#[test]
fn full_event_pool_does_not_strand_an_open_door() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());

    board.press_exit(&mut ctl);
    board.advance(&mut ctl, u32::from(DEFAULT_OPEN_TIME_MS) - 40);
    assert_eq!(state(&ctl), DoorState::Opening);

    // Open time runs out while the pool is full.
    board.flood_events();
    for _ in 0..60 {
        board.rt.tick();
    }
    board.rt.fire_due_timers(&mut ctl);
    assert!(!board.relay.is_high());
    assert_eq!(state(&ctl), DoorState::Opening);

    board.settle(&mut ctl);
    assert_eq!(state(&ctl), DoorState::Idle);
    assert_eq!(transitions(&ctl).last(), Some(&("Opening", "Idle")));

    // The door answers again.
    board.release_exit(&mut ctl);
    board.press_exit(&mut ctl);
    assert_eq!(state(&ctl), DoorState::Opening);
    assert_eq!(board.relay.activations(), 2);
}

// ── Reader faults ────────────────────────────────────────────

#[test]
fn unplugged_reader_reports_fault_once() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());

    board.unplug_reader(&mut ctl);
    assert_eq!(state(&ctl), DoorState::Error);
    let faults: Vec<_> = ctl
        .sink()
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::ReaderFault { .. }))
        .collect();
    assert_eq!(
        faults,
        vec![&AppEvent::ReaderFault {
            door: 0,
            fault: ReaderFault::Disconnected
        }]
    );

    board.advance(&mut ctl, 420);
    assert_eq!(state(&ctl), DoorState::Idle);

    // Reconnect; the reader decodes again.
    board.reader.on_edge(&board.rt, Line::D0, true);
    board.reader.on_edge(&board.rt, Line::D1, true);
    board.key(&mut ctl, 5);
    assert!(matches!(state(&ctl), DoorState::ReadingPin { .. }));
}

#[test]
fn malformed_word_is_an_error() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());

    board.raw_word(&mut ctl, 0b10110, 5);
    assert_eq!(state(&ctl), DoorState::Error);
    assert!(ctl.sink().events.contains(&AppEvent::ReaderFault {
        door: 0,
        fault: ReaderFault::InvalidFrame { bits: 5 }
    }));
}

// ── Stored configuration ─────────────────────────────────────

fn eeprom_with_open_time(open_time_ms: u16) -> Eeprom {
    let mut store = AccessStore::new(Eeprom::new(), 1).unwrap();
    let config = DoorConfig {
        open_time_ms,
        ..DoorConfig::default()
    };
    store.set_door_config(0, &config).unwrap();
    store.into_inner()
}

#[test]
fn stored_open_time_overrides_board_default() {
    let board = Board::new();
    let mut ctl = board.controller(eeprom_with_open_time(1500));
    assert_eq!(ctl.door(0).unwrap().open_time(), 1500);

    board.press_exit(&mut ctl);
    board.advance(&mut ctl, 1480);
    assert!(board.relay.is_high());
    board.advance(&mut ctl, 30);
    assert!(!board.relay.is_high());
    assert_eq!(state(&ctl), DoorState::Idle);
}

#[test]
fn out_of_range_stored_open_time_is_ignored() {
    let board = Board::new();
    let ctl = board.controller(eeprom_with_open_time(20_000));
    assert_eq!(ctl.door(0).unwrap().open_time(), DEFAULT_OPEN_TIME_MS);
}
