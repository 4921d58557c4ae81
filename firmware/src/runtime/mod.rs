use cortex_m::peripheral::SCB;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level as PinLevel, Output, OutputType, Pull, Speed};
use embassy_stm32::interrupt::{self, InterruptExt, Priority};
use embassy_stm32::time::khz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_time::Timer;
use glow_core::collaborators::{Collaborators, NoopRadio, NoopTransport};
use glow_core::config::{EnvelopeConfig, TimingConfig};
use glow_core::debounce::Level;
use glow_core::device::{BootReport, DeviceContext};
use glow_core::emission::POWER_CODES;
use glow_core::envelope::SharedBrightness;
use glow_core::time::Instant;

use crate::hw::{self, Board, BoardWatchdog, IrEmitter, SharedLights, TickSuspender};
use crate::status;
use crate::telemetry::TelemetryMirror;

mod tick_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cortex_m::interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}

/// Brightness shared between the envelope tick and the cooperative loop.
static BRIGHTNESS: SharedBrightness = SharedBrightness::new();

/// Runs the envelope tick at a priority above the thread-mode loop.
static TICK_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn CEC() {
    unsafe { TICK_EXECUTOR.on_interrupt() }
}

fn now() -> Instant {
    Instant::from_millis(embassy_time::Instant::now().as_millis())
}

/// Converts a core duration into an embassy one, saturating on overflow.
fn embassy_duration(duration: core::time::Duration) -> embassy_time::Duration {
    embassy_time::Duration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

fn log_boot(report: &BootReport) {
    defmt::info!("boot: mode={}", defmt::Display2Format(&report.mode));
    if let Err(error) = report.radio {
        defmt::warn!("boot: beacon radio disabled: {}", defmt::Display2Format(&error));
    }
    if let Some(Err(error)) = report.transport {
        defmt::warn!(
            "boot: update transport disabled: {}",
            defmt::Display2Format(&error)
        );
    }
}

#[embassy_executor::main]
pub async fn main(_spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA6,
        PB3,
        PB4,
        PB5,
        TIM3,
        IWDG,
        ..
    } = hal::init(config);

    let timing = match TimingConfig::default().validated() {
        Ok(timing) => timing,
        Err(error) => defmt::panic!("config: {}", defmt::Display2Format(&error)),
    };
    let envelope = EnvelopeConfig::default();

    hw::install_lights([
        Output::new(PB3, PinLevel::Low, Speed::Low),
        Output::new(PB4, PinLevel::Low, Speed::Low),
        Output::new(PB5, PinLevel::Low, Speed::Low),
    ]);
    let button = Input::new(PA0, Pull::Down);
    let mode_switch = Input::new(PA1, Pull::Down);

    let carrier = SimplePwm::new(
        TIM3,
        Some(PwmPin::new(PA6, OutputType::PushPull)),
        None,
        None,
        None,
        khz(38),
        Default::default(),
    );
    let watchdog_us = u32::try_from(timing.watchdog_timeout.as_micros()).unwrap_or(u32::MAX);

    let io = Collaborators::<Board> {
        emitter: IrEmitter::new(carrier),
        radio: NoopRadio::new(),
        transport: NoopTransport::new(),
        watchdog: BoardWatchdog::new(IndependentWatchdog::new(IWDG, watchdog_us)),
        lights: SharedLights,
        tick: TickSuspender,
        rng: hw::device_rng(),
    };

    let booted_at = now();
    let mut device = DeviceContext::new(
        timing,
        envelope,
        &POWER_CODES,
        &BRIGHTNESS,
        io,
        Level::from_high(button.is_high()),
        booted_at,
    );
    let report = device.boot(booted_at, mode_switch.is_high());
    log_boot(&report);

    interrupt::CEC.set_priority(Priority::P1);
    let tick_spawner = TICK_EXECUTOR.start(interrupt::CEC);
    tick_spawner
        .spawn(tick_task::run(
            embassy_duration(timing.pwm_tick),
            envelope.pwm_steps,
        ))
        .expect("failed to spawn envelope tick task");

    let mut mirror = TelemetryMirror::new();
    let loop_delay = embassy_duration(timing.loop_delay);
    loop {
        let at = now();
        let pass = device.poll(at, button.is_high());
        status::publish(&device.status(), at);
        mirror.flush(device.telemetry());

        if let Some(request) = pass.restart
            && request.is_due(at)
        {
            defmt::warn!("restart: {}", defmt::Display2Format(&request.reason));
            SCB::sys_reset();
        }

        Timer::after(loop_delay).await;
    }
}
