#![no_std]

// Runtime core for the glow remote.
//
// Everything here is portable across the MCU firmware and the host emulator:
// no clocks are read and no hardware is touched directly. Callers pass `now`
// into each per-pass call and supply the collaborators that own the pins,
// radios and watchdogs.

pub mod beacon;
pub mod collaborators;
pub mod config;
pub mod debounce;
pub mod device;
pub mod emission;
pub mod envelope;
pub mod mode;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod time;
