//! Board adapters that implement the `glow-core` collaborator traits.
//!
//! This board carries three light outputs, an IR LED on a timer channel and
//! the IWDG. No radio or update transport is fitted, so those collaborators
//! are the core's unavailable stand-ins and the device degrades at boot.

use core::cell::RefCell;

use embassy_stm32::gpio::{Level as PinLevel, Output};
use embassy_stm32::peripherals::{IWDG, TIM3};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embassy_time::{Duration, block_for};
use glow_core::collaborators::{
    EnvelopeTickControl, LightOutputs, LivenessWatchdog, NoopRadio, NoopTransport, PatternEmitter,
    Platform,
};
use glow_core::emission::EmissionPattern;
use portable_atomic::{AtomicBool, Ordering};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::ir::{self, Run};

/// Number of light outputs driven together.
pub const LIGHT_COUNT: usize = 3;

const CARRIER_DUTY_PERCENT: u8 = 33;

type LightPins = [Output<'static>; LIGHT_COUNT];

/// Light outputs, shared by the envelope tick and the cooperative loop.
static LIGHTS: CriticalSectionMutex<RefCell<Option<LightPins>>> =
    CriticalSectionMutex::new(RefCell::new(None));

/// Set once the envelope tick has been suspended for an update transfer.
static TICK_SUSPENDED: AtomicBool = AtomicBool::new(false);

/// Hands the light pins to the shared slot. Call once during init.
pub fn install_lights(pins: LightPins) {
    LIGHTS.lock(|slot| *slot.borrow_mut() = Some(pins));
}

/// Returns `true` once the update transport asked for the tick to stop.
pub fn tick_suspended() -> bool {
    TICK_SUSPENDED.load(Ordering::Acquire)
}

/// Handle onto the shared light outputs; every access takes a critical section.
#[derive(Copy, Clone, Default)]
pub struct SharedLights;

impl LightOutputs for SharedLights {
    fn drive(&mut self, on: bool) {
        let level = if on { PinLevel::High } else { PinLevel::Low };
        LIGHTS.lock(|slot| {
            if let Some(pins) = slot.borrow_mut().as_mut() {
                for pin in pins.iter_mut() {
                    pin.set_level(level);
                }
            }
        });
    }
}

/// Flags the envelope tick task to park with the lights off.
#[derive(Copy, Clone, Default)]
pub struct TickSuspender;

impl EnvelopeTickControl for TickSuspender {
    fn suspend(&mut self) {
        TICK_SUSPENDED.store(true, Ordering::Release);
    }
}

/// IR LED driven by a 4-channel timer; channel 1 carries the modulated carrier.
pub struct IrEmitter {
    pwm: SimplePwm<'static, TIM3>,
}

impl IrEmitter {
    pub fn new(mut pwm: SimplePwm<'static, TIM3>) -> Self {
        pwm.ch1().disable();
        Self { pwm }
    }

    fn play(&mut self, runs: &[Run]) {
        for run in runs {
            match *run {
                Run::Mark(us) => {
                    self.pwm.ch1().enable();
                    block_for(Duration::from_micros(u64::from(us)));
                }
                Run::Space(us) => {
                    self.pwm.ch1().disable();
                    block_for(Duration::from_micros(u64::from(us)));
                }
            }
        }
        self.pwm.ch1().disable();
    }
}

impl PatternEmitter for IrEmitter {
    fn transmit(&mut self, pattern: &EmissionPattern) {
        let frame = match ir::encode(pattern) {
            Ok(frame) => frame,
            Err(error) => {
                defmt::warn!(
                    "ir: skipping {} pattern: {}",
                    defmt::Display2Format(&pattern.protocol),
                    defmt::Display2Format(&error)
                );
                return;
            }
        };

        self.pwm.set_frequency(Hertz(frame.carrier_hz()));
        self.pwm.ch1().set_duty_cycle_percent(CARRIER_DUTY_PERCENT);
        for repeat in 0..frame.repeats() {
            if repeat > 0 {
                block_for(Duration::from_micros(u64::from(frame.gap_us())));
            }
            self.play(frame.runs());
        }
    }
}

/// Independent watchdog. Once unleashed the IWDG cannot be stopped, so
/// releasing it only stops petting and the board resets after the timeout.
pub struct BoardWatchdog {
    dog: IndependentWatchdog<'static, IWDG>,
    released: bool,
}

impl BoardWatchdog {
    pub fn new(mut dog: IndependentWatchdog<'static, IWDG>) -> Self {
        dog.unleash();
        Self {
            dog,
            released: false,
        }
    }
}

impl LivenessWatchdog for BoardWatchdog {
    fn feed(&mut self) {
        if !self.released {
            self.dog.pet();
        }
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Seeds the beacon RNG from the factory-programmed device id.
pub fn device_rng() -> SmallRng {
    let uid = embassy_stm32::uid::uid();
    let seed = uid
        .iter()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
        });
    SmallRng::seed_from_u64(seed)
}

/// Collaborator set for this board.
pub struct Board;

impl Platform for Board {
    type Emitter = IrEmitter;
    type Radio = NoopRadio;
    type Transport = NoopTransport;
    type Watchdog = BoardWatchdog;
    type Lights = SharedLights;
    type Tick = TickSuspender;
    type Rng = SmallRng;
}
