#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use glow_core::beacon::{AdvertisingKind, BeaconAddress, TxPowerStep};
use glow_core::collaborators::{
    BeaconRadio, BringUpError, Collaborators, EnvelopeTickControl, LightOutputs,
    LivenessWatchdog, PatternEmitter, Platform, TransportEvent, TransportFault, UpdateTransport,
};
use glow_core::config::{EnvelopeConfig, TimingConfig};
use glow_core::debounce::Level;
use glow_core::device::{DeviceContext, PassReport};
use glow_core::emission::{EmissionPattern, POWER_CODES};
use glow_core::envelope::SharedBrightness;
use glow_core::time::Instant;
use rand::{SeedableRng, rngs::SmallRng};

/// Collaborator call, logged in the order it happened.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Transmit(EmissionPattern),
    RadioBringUp,
    RadioStop,
    RadioStart,
    RadioPayload,
    RadioPower(TxPowerStep),
    TransportBegin,
    TransportService,
    TransportEnd,
    Feed,
    Release,
    Lights(bool),
    TickSuspend,
}

pub type Log = Rc<RefCell<Vec<Call>>>;
pub type Clock = Rc<Cell<u64>>;

pub struct Emitter {
    log: Log,
    clock: Clock,
    pub cost_ms: Rc<Cell<u64>>,
}

impl PatternEmitter for Emitter {
    fn transmit(&mut self, pattern: &EmissionPattern) {
        self.log.borrow_mut().push(Call::Transmit(*pattern));
        self.clock.set(self.clock.get() + self.cost_ms.get());
    }
}

pub struct Radio {
    log: Log,
    fitted: bool,
}

impl BeaconRadio for Radio {
    fn bring_up(&mut self) -> Result<(), BringUpError> {
        self.log.borrow_mut().push(Call::RadioBringUp);
        if self.fitted {
            Ok(())
        } else {
            Err(BringUpError::Unavailable)
        }
    }

    fn set_address(&mut self, address: BeaconAddress) {
        assert_eq!(address.octets()[0] & 0xF0, 0xF0);
    }

    fn set_advertisement_payload(&mut self, payload: &[u8]) {
        assert!(!payload.is_empty() && payload.len() <= 31);
        self.log.borrow_mut().push(Call::RadioPayload);
    }

    fn set_advertising_kind(&mut self, _: AdvertisingKind) {}

    fn set_tx_power(&mut self, step: TxPowerStep) {
        self.log.borrow_mut().push(Call::RadioPower(step));
    }

    fn start(&mut self) {
        self.log.borrow_mut().push(Call::RadioStart);
    }

    fn stop(&mut self) {
        self.log.borrow_mut().push(Call::RadioStop);
    }
}

pub struct Transport {
    log: Log,
    begin: Result<(), BringUpError>,
    pub script: Rc<RefCell<VecDeque<Result<TransportEvent, TransportFault>>>>,
}

impl UpdateTransport for Transport {
    fn begin(&mut self) -> Result<(), BringUpError> {
        self.log.borrow_mut().push(Call::TransportBegin);
        self.begin
    }

    fn service_once(&mut self) -> Result<TransportEvent, TransportFault> {
        self.log.borrow_mut().push(Call::TransportService);
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(TransportEvent::Idle))
    }

    fn end(&mut self) {
        self.log.borrow_mut().push(Call::TransportEnd);
    }
}

pub struct Watchdog {
    log: Log,
}

impl LivenessWatchdog for Watchdog {
    fn feed(&mut self) {
        self.log.borrow_mut().push(Call::Feed);
    }

    fn release(&mut self) {
        self.log.borrow_mut().push(Call::Release);
    }
}

pub struct Lights {
    log: Log,
}

impl LightOutputs for Lights {
    fn drive(&mut self, on: bool) {
        self.log.borrow_mut().push(Call::Lights(on));
    }
}

pub struct Tick {
    log: Log,
}

impl EnvelopeTickControl for Tick {
    fn suspend(&mut self) {
        self.log.borrow_mut().push(Call::TickSuspend);
    }
}

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Emitter = Emitter;
    type Radio = Radio;
    type Transport = Transport;
    type Watchdog = Watchdog;
    type Lights = Lights;
    type Tick = Tick;
    type Rng = SmallRng;
}

/// Options for building a [`Harness`].
pub struct Setup {
    pub maintenance: bool,
    pub radio_fitted: bool,
    pub transport_begin: Result<(), BringUpError>,
    pub start_ms: u64,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            maintenance: false,
            radio_fitted: true,
            transport_begin: Ok(()),
            start_ms: 0,
        }
    }
}

pub struct Harness {
    pub log: Log,
    pub clock: Clock,
    pub emit_cost_ms: Rc<Cell<u64>>,
    pub transport_script: Rc<RefCell<VecDeque<Result<TransportEvent, TransportFault>>>>,
    pub brightness: &'static SharedBrightness,
    pub device: DeviceContext<'static, TestPlatform>,
    pub button_high: bool,
}

impl Harness {
    pub fn boot(setup: Setup) -> Self {
        let log: Log = Rc::default();
        let clock: Clock = Rc::new(Cell::new(setup.start_ms));
        let emit_cost_ms = Rc::new(Cell::new(0));
        let transport_script = Rc::new(RefCell::new(VecDeque::new()));
        let brightness: &'static SharedBrightness = Box::leak(Box::new(SharedBrightness::new()));

        let io = Collaborators::<TestPlatform> {
            emitter: Emitter {
                log: log.clone(),
                clock: clock.clone(),
                cost_ms: emit_cost_ms.clone(),
            },
            radio: Radio {
                log: log.clone(),
                fitted: setup.radio_fitted,
            },
            transport: Transport {
                log: log.clone(),
                begin: setup.transport_begin,
                script: transport_script.clone(),
            },
            watchdog: Watchdog { log: log.clone() },
            lights: Lights { log: log.clone() },
            tick: Tick { log: log.clone() },
            rng: SmallRng::seed_from_u64(0x61_6c_6f_77),
        };

        let now = Instant::from_millis(setup.start_ms);
        let mut device = DeviceContext::new(
            TimingConfig::default(),
            EnvelopeConfig::default(),
            &POWER_CODES,
            brightness,
            io,
            Level::Low,
            now,
        );
        device.boot(now, setup.maintenance);

        Self {
            log,
            clock,
            emit_cost_ms,
            transport_script,
            brightness,
            device,
            button_high: false,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.get()
    }

    /// One pass at the current clock, then the fixed loop delay.
    pub fn step(&mut self) -> PassReport {
        let report = self
            .device
            .poll(Instant::from_millis(self.clock.get()), self.button_high);
        self.clock.set(self.clock.get() + 10);
        report
    }

    /// Runs passes until the clock reaches `until_ms`.
    pub fn run_until(&mut self, until_ms: u64) -> Vec<PassReport> {
        let mut reports = Vec::new();
        while self.clock.get() < until_ms {
            reports.push(self.step());
        }
        reports
    }

    pub fn press(&mut self) {
        self.button_high = true;
    }

    pub fn release(&mut self) {
        self.button_high = false;
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.log.borrow().iter().filter(|call| wanted(call)).count()
    }
}
