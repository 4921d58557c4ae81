use embassy_time::{Duration, Ticker};
use glow_core::collaborators::LightOutputs;
use glow_core::envelope::PwmTick;

use super::BRIGHTNESS;
use crate::hw::{self, SharedLights};

/// Software PWM for the light outputs. Ends, lights off, once suspended.
#[embassy_executor::task]
pub async fn run(period: Duration, steps: u8) {
    let mut ticker = Ticker::every(period);
    let mut pwm = PwmTick::new(steps);
    let mut lights = SharedLights;

    while !hw::tick_suspended() {
        pwm.tick(&BRIGHTNESS, &mut lights);
        ticker.next().await;
    }

    lights.all_off();
    defmt::info!("envelope tick suspended");
}
