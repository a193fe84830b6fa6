//! Host protocol flows over the framed serial link.
//!
//! Requests are encoded to wire bytes and fed through the RX path one
//! byte at a time; replies and events are decoded from whatever the
//! controller handed to the serial port.

use doorctl::app::commands::{Command, DeviceDescriptor, EVENT_DOOR_STATE, EVENT_STARTED};
use doorctl::app::events::AppEvent;
use doorctl::config::{DEFAULT_OPEN_TIME_MS, DoorConfig, FIRMWARE_VERSION_MAJOR, FIRMWARE_VERSION_MINOR};
use doorctl::fsm::states::DoorState;
use doorctl::rpc::codec::{KIND_OK, MAX_FRAME_SIZE, Message, encode_frame};
use doorctl::rpc::transport::Link;
use doorctl::store::{AccessKind, AccessRecord};
use doorctl::Error;

use super::mock_hw::{Board, Eeprom, TestController};

fn fresh(board: &Board) -> TestController<'_> {
    let mut ctl = board.controller(Eeprom::new());
    ctl.serial_mut().take_messages();
    ctl
}

/// Send `cmd` and return its reply.  Earlier traffic is discarded.
fn call(board: &Board, ctl: &mut TestController<'_>, cmd: Command) -> Message {
    ctl.serial_mut().take_messages();
    let mut sent = board.request(ctl, &cmd.encode().unwrap());
    assert_eq!(sent.len(), 1, "expected exactly one reply, got {sent:?}");
    sent.remove(0)
}

fn door_event(state: DoorState) -> Message {
    Message::event(EVENT_DOOR_STATE, &[0, state.code()]).unwrap()
}

#[test]
fn started_event_is_sent_at_boot() {
    let board = Board::new();
    let mut ctl = board.controller(Eeprom::new());
    assert_eq!(
        ctl.serial_mut().take_messages(),
        vec![Message::event(EVENT_STARTED, &[]).unwrap()]
    );
}

#[test]
fn descriptor_reports_layout() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    let reply = call(&board, &mut ctl, Command::GetDeviceDescriptor);
    assert_eq!(reply.kind, KIND_OK);
    let desc = DeviceDescriptor::from_bytes(&reply.payload).unwrap();
    assert_eq!(desc.major, FIRMWARE_VERSION_MAJOR);
    assert_eq!(desc.minor, FIRMWARE_VERSION_MINOR);
    assert_eq!(desc.doors, 1);
    // (512 - 7) / 5
    assert_eq!(desc.records, 101);
    assert_eq!(desc.free_records, 101);
}

#[test]
fn ping_echoes_payload() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    let data = heapless::Vec::from_slice(&[0x7E, 0x7D, 0x00, 0xFF]).unwrap();
    let reply = call(&board, &mut ctl, Command::Ping(data));
    assert_eq!(reply, Message::ok(&[0x7E, 0x7D, 0x00, 0xFF]).unwrap());
}

#[test]
fn card_granted_over_the_wire_opens_the_door() {
    let board = Board::new();
    let mut ctl = fresh(&board);
    let record = AccessRecord::new(AccessKind::Card, 0x0012_3456, 0b0001);

    let reply = call(&board, &mut ctl, Command::SetAccess(record));
    assert_eq!(reply, Message::ok(&[]).unwrap());

    let reply = call(&board, &mut ctl, Command::GetAccess(record));
    assert_eq!(reply.payload.as_slice(), &[0b0001]);

    board.card(&mut ctl, 0x0012_3456);
    assert_eq!(ctl.door(0).unwrap().state(), DoorState::Opening);
    assert!(board.relay.is_high());

    // The card has been used, so nothing unused is left.
    let reply = call(
        &board,
        &mut ctl,
        Command::GetUnusedAccess {
            start: 0,
            clear: false,
        },
    );
    assert_eq!(&reply.payload[..5], &AccessRecord::NONE.pack());
    assert_eq!(&reply.payload[5..], &101u16.to_le_bytes());
}

#[test]
fn removed_access_no_longer_opens() {
    let board = Board::new();
    let mut ctl = fresh(&board);
    let record = AccessRecord::new(AccessKind::Card, 77, 0b0001);
    call(&board, &mut ctl, Command::SetAccess(record));
    call(&board, &mut ctl, Command::RemoveAllAccess);

    board.card(&mut ctl, 77);
    assert_eq!(ctl.door(0).unwrap().state(), DoorState::Rejected);
    assert_eq!(board.relay.activations(), 0);
}

#[test]
fn door_config_changes_live_open_time() {
    let board = Board::new();
    let mut ctl = fresh(&board);
    let config = DoorConfig {
        open_time_ms: 1000,
        ..DoorConfig::default()
    };

    let reply = call(&board, &mut ctl, Command::SetDoorConfig { index: 0, config });
    assert_eq!(reply.kind, KIND_OK);
    assert_eq!(ctl.door(0).unwrap().open_time(), 1000);
    assert!(ctl.sink().events.contains(&AppEvent::OpenTimeChanged {
        door: 0,
        open_time: 1000
    }));

    let reply = call(&board, &mut ctl, Command::GetDoorConfig { index: 0 });
    assert_eq!(reply.payload.as_slice(), &config.to_bytes());

    board.press_exit(&mut ctl);
    board.advance(&mut ctl, 980);
    assert!(board.relay.is_high());
    board.advance(&mut ctl, 30);
    assert!(!board.relay.is_high());

    // Zero hands the door back to the board default.
    let reply = call(
        &board,
        &mut ctl,
        Command::SetDoorConfig {
            index: 0,
            config: DoorConfig::default(),
        },
    );
    assert_eq!(reply.kind, KIND_OK);
    assert_eq!(ctl.door(0).unwrap().open_time(), DEFAULT_OPEN_TIME_MS);
}

#[test]
fn door_config_for_missing_door_is_rejected() {
    let board = Board::new();
    let mut ctl = fresh(&board);
    let reply = call(&board, &mut ctl, Command::GetDoorConfig { index: 3 });
    assert_eq!(reply.error_code(), Some(Error::InvalidArgument));
}

#[test]
fn corrupted_frame_replies_checksum_error() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    let mut frame = [0u8; MAX_FRAME_SIZE];
    let len = encode_frame(&Message::new(2, &[0x11]).unwrap(), &mut frame).unwrap();
    // START, kind, length, payload...
    frame[3] = 0x12;

    let sent = board.send_bytes(&mut ctl, &frame[..len]);
    assert_eq!(sent, vec![Message::error(Error::Checksum)]);
    assert_eq!(sent[0].payload.as_slice(), &[(-74i8) as u8]);
    assert!(ctl.sink().events.contains(&AppEvent::CommandFailed {
        kind: None,
        error: Error::Checksum
    }));

    // The link recovers for the next request.
    let reply = call(&board, &mut ctl, Command::GetDeviceDescriptor);
    assert_eq!(reply.kind, KIND_OK);
}

#[test]
fn unknown_command_replies_not_found() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    let sent = board.request(&mut ctl, &Message::new(99, &[]).unwrap());
    assert_eq!(sent, vec![Message::error(Error::NotFound)]);
    assert!(ctl.sink().events.contains(&AppEvent::CommandFailed {
        kind: Some(99),
        error: Error::NotFound
    }));
    assert_eq!(ctl.engine().failed(), 1);
}

#[test]
fn door_state_events_follow_transitions() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    board.press_exit(&mut ctl);
    assert_eq!(
        ctl.serial_mut().take_messages(),
        vec![door_event(DoorState::Opening)]
    );

    board.advance(&mut ctl, u32::from(DEFAULT_OPEN_TIME_MS));
    assert_eq!(
        ctl.serial_mut().take_messages(),
        vec![door_event(DoorState::Idle)]
    );
}

#[test]
fn events_wait_behind_a_half_read_request() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    let mut frame = [0u8; MAX_FRAME_SIZE];
    let len = encode_frame(&Command::GetDeviceDescriptor.encode().unwrap(), &mut frame).unwrap();

    assert!(board.send_bytes(&mut ctl, &frame[..2]).is_empty());
    board.press_exit(&mut ctl);
    assert!(ctl.serial_mut().take_messages().is_empty());
    assert_eq!(board.transport.queued(), 1);

    let sent = board.send_bytes(&mut ctl, &frame[2..len]);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind, KIND_OK);
    assert_eq!(sent[1], door_event(DoorState::Opening));
    assert_eq!(board.transport.queued(), 0);
}

#[test]
fn refused_event_is_resent_once_the_port_recovers() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    ctl.serial_mut().fail = true;
    board.press_exit(&mut ctl);
    assert!(ctl.serial_mut().take_messages().is_empty());
    assert_eq!(board.transport.queued(), 1);

    ctl.serial_mut().fail = false;
    board.advance(&mut ctl, 1);
    assert_eq!(
        ctl.serial_mut().take_messages(),
        vec![door_event(DoorState::Opening)]
    );
    assert_eq!(board.transport.queued(), 0);
}

#[test]
fn outbox_drains_when_transmit_done_is_lost() {
    let board = Board::new();
    let mut ctl = fresh(&board);

    let mut frame = [0u8; MAX_FRAME_SIZE];
    let len = encode_frame(&Command::GetDeviceDescriptor.encode().unwrap(), &mut frame).unwrap();
    for &b in &frame[..len] {
        board.transport.on_byte(&board.rt, b);
    }
    board.rt.run_until_idle(&mut ctl);
    assert_eq!(board.transport.link(), Link::Transmitting);

    // Exit pressed while the reply is still on the wire.
    board.button.on_edge(&board.rt, false);
    for _ in 0..=board.setup.button_debounce_ms {
        board.rt.tick();
        board.rt.run_until_idle(&mut ctl);
    }
    assert_eq!(ctl.door(0).unwrap().state(), DoorState::Opening);
    assert_eq!(board.transport.queued(), 1);

    board.flood_events();
    board.transport.on_transmit_complete(&board.rt);
    board.settle(&mut ctl);

    let sent = ctl.serial_mut().take_messages();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind, KIND_OK);
    assert_eq!(sent[1], door_event(DoorState::Opening));
    assert_eq!(board.transport.queued(), 0);
}
