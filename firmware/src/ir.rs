#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Mark/space framing for the remote-control protocols in the emission table.
//!
//! Frames are rendered ahead of time into a bounded run list so the emitter
//! only has to gate the carrier on and off. Payload bits are sent most
//! significant first, using the low `bits` bits of the pattern code.

use core::fmt;

use glow_core::emission::{EmissionPattern, IrProtocol};
use heapless::Vec;

/// Upper bound on runs in one frame (64-bit pulse-distance payload plus framing).
pub const MAX_RUNS: usize = 136;

const MAX_PAYLOAD_BITS: u16 = 64;

/// Carrier on (`Mark`) or off (`Space`) for the given number of microseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Run {
    Mark(u16),
    Space(u16),
}

impl Run {
    pub const fn micros(self) -> u16 {
        match self {
            Run::Mark(us) | Run::Space(us) => us,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncodeError {
    EmptyPayload,
    PayloadTooWide(u16),
    FrameOverflow,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::EmptyPayload => f.write_str("pattern carries no bits"),
            EncodeError::PayloadTooWide(bits) => write!(f, "{bits}-bit payload exceeds 64 bits"),
            EncodeError::FrameOverflow => f.write_str("frame exceeds run capacity"),
        }
    }
}

/// Rendered frame ready for playback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IrFrame {
    carrier_hz: u32,
    repeats: u8,
    gap_us: u32,
    runs: Vec<Run, MAX_RUNS>,
}

impl IrFrame {
    const fn empty(carrier_hz: u32, repeats: u8, gap_us: u32) -> Self {
        Self {
            carrier_hz,
            repeats,
            gap_us,
            runs: Vec::new(),
        }
    }

    pub const fn carrier_hz(&self) -> u32 {
        self.carrier_hz
    }

    /// How many times the frame is sent back to back.
    pub const fn repeats(&self) -> u8 {
        self.repeats
    }

    /// Carrier-off time between repeats.
    pub const fn gap_us(&self) -> u32 {
        self.gap_us
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Airtime of a single frame, excluding repeats.
    pub fn duration_us(&self) -> u32 {
        self.runs.iter().map(|run| u32::from(run.micros())).sum()
    }

    fn mark(&mut self, us: u16) -> Result<(), EncodeError> {
        self.push(Run::Mark(us))
    }

    fn space(&mut self, us: u16) -> Result<(), EncodeError> {
        self.push(Run::Space(us))
    }

    // Adjacent runs of the same kind merge, which keeps Manchester output alternating.
    fn push(&mut self, run: Run) -> Result<(), EncodeError> {
        if let Some(last) = self.runs.last_mut() {
            match (*last, run) {
                (Run::Mark(a), Run::Mark(b)) => {
                    *last = Run::Mark(a.saturating_add(b));
                    return Ok(());
                }
                (Run::Space(a), Run::Space(b)) => {
                    *last = Run::Space(a.saturating_add(b));
                    return Ok(());
                }
                _ => {}
            }
        }
        self.runs.push(run).map_err(|_| EncodeError::FrameOverflow)
    }
}

/// Mark/space pair for each bit value plus optional framing.
struct BitTiming {
    header: Option<(u16, u16)>,
    one: (u16, u16),
    zero: (u16, u16),
    footer_mark: Option<u16>,
}

const NEC: BitTiming = BitTiming {
    header: Some((9000, 4500)),
    one: (560, 1690),
    zero: (560, 560),
    footer_mark: Some(560),
};

const SAMSUNG: BitTiming = BitTiming {
    header: Some((4500, 4500)),
    one: (560, 1690),
    zero: (560, 560),
    footer_mark: Some(560),
};

const SHARP: BitTiming = BitTiming {
    header: None,
    one: (320, 1680),
    zero: (320, 680),
    footer_mark: Some(320),
};

// Sony varies the mark instead of the space.
const SONY: BitTiming = BitTiming {
    header: Some((2400, 600)),
    one: (1200, 600),
    zero: (600, 600),
    footer_mark: None,
};

const RC6_UNIT_US: u16 = 444;
const RC6_LEADER: (u16, u16) = (2666, 889);
const RC6_TRAILER_BIT: u16 = 3;

/// Renders `pattern` into a playable frame.
pub fn encode(pattern: &EmissionPattern) -> Result<IrFrame, EncodeError> {
    let bits = pattern.bits;
    if bits == 0 {
        return Err(EncodeError::EmptyPayload);
    }
    if bits > MAX_PAYLOAD_BITS {
        return Err(EncodeError::PayloadTooWide(bits));
    }

    match pattern.protocol {
        IrProtocol::Nec => encode_bits(IrFrame::empty(38_000, 1, 40_000), &NEC, pattern.code, bits),
        IrProtocol::Samsung => {
            encode_bits(IrFrame::empty(38_000, 1, 47_000), &SAMSUNG, pattern.code, bits)
        }
        IrProtocol::Sharp => {
            encode_bits(IrFrame::empty(38_000, 1, 40_000), &SHARP, pattern.code, bits)
        }
        IrProtocol::Sony => encode_bits(IrFrame::empty(40_000, 3, 25_000), &SONY, pattern.code, bits),
        IrProtocol::Rc6 => encode_rc6(pattern.code, bits),
    }
}

fn payload_bits(code: u64, bits: u16) -> impl Iterator<Item = bool> {
    (0..bits).rev().map(move |bit| (code >> bit) & 1 == 1)
}

fn encode_bits(
    mut frame: IrFrame,
    timing: &BitTiming,
    code: u64,
    bits: u16,
) -> Result<IrFrame, EncodeError> {
    if let Some((mark, space)) = timing.header {
        frame.mark(mark)?;
        frame.space(space)?;
    }
    for one in payload_bits(code, bits) {
        let (mark, space) = if one { timing.one } else { timing.zero };
        frame.mark(mark)?;
        frame.space(space)?;
    }
    if let Some(mark) = timing.footer_mark {
        frame.mark(mark)?;
    }
    Ok(frame)
}

fn encode_rc6(code: u64, bits: u16) -> Result<IrFrame, EncodeError> {
    let mut frame = IrFrame::empty(36_000, 1, 83_000);
    frame.mark(RC6_LEADER.0)?;
    frame.space(RC6_LEADER.1)?;

    // Start bit, always one.
    manchester(&mut frame, true, RC6_UNIT_US)?;
    for (index, one) in payload_bits(code, bits).enumerate() {
        let unit = if index == usize::from(RC6_TRAILER_BIT) {
            RC6_UNIT_US * 2
        } else {
            RC6_UNIT_US
        };
        manchester(&mut frame, one, unit)?;
    }
    Ok(frame)
}

fn manchester(frame: &mut IrFrame, one: bool, unit: u16) -> Result<(), EncodeError> {
    if one {
        frame.mark(unit)?;
        frame.space(unit)
    } else {
        frame.space(unit)?;
        frame.mark(unit)
    }
}
