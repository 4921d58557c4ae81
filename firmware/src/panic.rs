use core::panic::PanicInfo;

use defmt::error;

use crate::status;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("PANIC: {}", defmt::Display2Format(info));
    if let Some((snapshot, at)) = status::last_published() {
        error!(
            "last pass {}: {}",
            defmt::Display2Format(&at),
            defmt::Display2Format(&snapshot)
        );
    }
    cortex_m::asm::udf();
}
