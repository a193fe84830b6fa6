//! Mock hardware for integration tests.
//!
//! Pins share their level through `Rc<Cell>` so a test keeps a handle
//! after the pin moves into a door.  The serial mock records every frame
//! handed to it; the sink records every application event.  [`Board`]
//! owns the runtime and the ISR-side drivers and plays the part of the
//! interrupt handlers.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use doorctl::adapters::eeprom::{ATMEGA168_EEPROM_SIZE, MemoryEeprom};
use doorctl::app::events::AppEvent;
use doorctl::app::ports::{EventSink, SerialPort};
use doorctl::app::service::{Controller, Target};
use doorctl::config::{DoorSetup, WORD_TIMEOUT_MS};
use doorctl::drivers::button::DebouncedInput;
use doorctl::drivers::wiegand::{Line, WiegandReader, encode_card, encode_key};
use doorctl::events::Payload;
use doorctl::fsm::DoorController;
use doorctl::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE, Message, encode_frame};
use doorctl::rpc::transport::{Link, SerialTransport};
use doorctl::runtime::Runtime;
use doorctl::store::AccessStore;
use embedded_hal::digital::{ErrorType, OutputPin};

pub type Eeprom = MemoryEeprom<ATMEGA168_EEPROM_SIZE>;
pub type TestController<'a> = Controller<'a, MockPin, Eeprom, MockSerial, RecordingSink>;

// ── Pins ──────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockPin {
    level: Rc<Cell<bool>>,
    activations: Rc<Cell<usize>>,
}

#[allow(dead_code)]
impl MockPin {
    pub fn is_high(&self) -> bool {
        self.level.get()
    }

    /// Times the pin was driven high.
    pub fn activations(&self) -> usize {
        self.activations.get()
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level.set(true);
        self.activations.set(self.activations.get() + 1);
        Ok(())
    }
}

// ── Serial ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSerial {
    pub frames: Vec<Vec<u8>>,
    /// Refuse every frame, like a UART with its buffer held.
    pub fail: bool,
}

#[allow(dead_code)]
impl MockSerial {
    /// Decode and clear everything sent so far.
    pub fn take_messages(&mut self) -> Vec<Message> {
        let mut decoder = FrameDecoder::new();
        self.frames
            .drain(..)
            .flatten()
            .filter_map(|b| decoder.push(b))
            .map(|r| r.expect("controller sent a malformed frame"))
            .collect()
    }
}

impl SerialPort for MockSerial {
    fn submit(&mut self, frame: &[u8]) -> doorctl::Result<()> {
        if self.fail {
            return Err(doorctl::Error::Io);
        }
        self.frames.push(frame.to_vec());
        Ok(())
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

// ── Board ─────────────────────────────────────────────────────

pub struct Board {
    pub rt: Runtime<Target>,
    pub reader: WiegandReader,
    pub button: DebouncedInput,
    pub transport: SerialTransport,
    pub setup: DoorSetup,
    pub relay: MockPin,
    pub led: MockPin,
    pub buzzer: MockPin,
}

#[allow(dead_code)]
impl Board {
    pub fn new() -> Self {
        let rt = Runtime::new();
        let setup = DoorSetup::new(0);
        let reader = WiegandReader::new(&rt).unwrap();
        let button =
            DebouncedInput::new(&rt, setup.button_debounce_ms, setup.button_active_low).unwrap();
        button.init_level(true);
        let transport = SerialTransport::new(&rt).unwrap();
        Self {
            rt,
            reader,
            button,
            transport,
            setup,
            relay: MockPin::default(),
            led: MockPin::default(),
            buzzer: MockPin::default(),
        }
    }

    /// Controller with one door over `eeprom`, started and settled.
    pub fn controller(&self, eeprom: Eeprom) -> TestController<'_> {
        let store = AccessStore::new(eeprom, 1).unwrap();
        let mut ctl = Controller::new(
            &self.rt,
            store,
            &self.transport,
            MockSerial::default(),
            RecordingSink::default(),
        )
        .unwrap();
        let door = DoorController::new(
            &self.rt,
            &self.setup,
            self.relay.clone(),
            Some(self.led.clone()),
            Some(self.buzzer.clone()),
        )
        .unwrap();
        ctl.add_door(&self.rt, door, &self.reader, Some(&self.button))
            .unwrap();
        ctl.start();
        self.settle(&mut ctl);
        ctl
    }

    /// Run the loop dry, completing every transmission the controller
    /// starts the way the TX-complete ISR would.
    pub fn settle(&self, ctl: &mut TestController<'_>) {
        loop {
            self.rt.run_until_idle(ctl);
            if self.transport.link() != Link::Transmitting {
                break;
            }
            self.transport.on_transmit_complete(&self.rt);
        }
    }

    pub fn advance(&self, ctl: &mut TestController<'_>, ms: u32) {
        for _ in 0..ms {
            self.rt.tick();
            self.settle(ctl);
        }
    }

    fn wiegand(&self, ctl: &mut TestController<'_>, bits: u64, count: u8) {
        for i in 0..count {
            let line = if (bits >> i) & 1 != 0 { Line::D1 } else { Line::D0 };
            self.reader.on_edge(&self.rt, line, false);
            self.reader.on_edge(&self.rt, line, true);
        }
        self.advance(ctl, u32::from(WORD_TIMEOUT_MS) + 1);
    }

    pub fn key(&self, ctl: &mut TestController<'_>, key: u8) {
        self.wiegand(ctl, encode_key(key), 4);
    }

    pub fn card(&self, ctl: &mut TestController<'_>, card: u32) {
        self.wiegand(ctl, encode_card(card), 26);
    }

    /// Raw word of `count` bits, for malformed frames.
    pub fn raw_word(&self, ctl: &mut TestController<'_>, bits: u64, count: u8) {
        self.wiegand(ctl, bits, count);
    }

    pub fn unplug_reader(&self, ctl: &mut TestController<'_>) {
        self.reader.on_edge(&self.rt, Line::D0, false);
        self.reader.on_edge(&self.rt, Line::D1, false);
        self.settle(ctl);
    }

    pub fn press_exit(&self, ctl: &mut TestController<'_>) {
        // Active-low button with a bouncy contact.
        self.button.on_edge(&self.rt, false);
        self.button.on_edge(&self.rt, true);
        self.button.on_edge(&self.rt, false);
        self.advance(ctl, u32::from(self.setup.button_debounce_ms) + 1);
    }

    pub fn release_exit(&self, ctl: &mut TestController<'_>) {
        self.button.on_edge(&self.rt, true);
        self.advance(ctl, u32::from(self.setup.button_debounce_ms) + 1);
    }

    /// Fill the event pool from a source no handler listens to.
    pub fn flood_events(&self) {
        let noise = self.rt.allocate_source().unwrap();
        while self.rt.post(noise, Payload::Key(0)).is_ok() {}
    }

    /// Deliver `msg` over the link and return every message sent back.
    pub fn request(&self, ctl: &mut TestController<'_>, msg: &Message) -> Vec<Message> {
        let mut frame = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(msg, &mut frame).unwrap();
        self.send_bytes(ctl, &frame[..len])
    }

    pub fn send_bytes(&self, ctl: &mut TestController<'_>, bytes: &[u8]) -> Vec<Message> {
        for &b in bytes {
            self.transport.on_byte(&self.rt, b);
        }
        self.settle(ctl);
        ctl.serial_mut().take_messages()
    }
}
