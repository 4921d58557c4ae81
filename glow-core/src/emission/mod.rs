//! Remote-control pattern table and the cursor that cycles through it.

use core::fmt;

use crate::collaborators::PatternEmitter;

/// Remote-control encoding understood by the emitter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IrProtocol {
    Samsung,
    Nec,
    Sony,
    Rc6,
    Sharp,
}

impl IrProtocol {
    /// Stable numeric identifier handed to hardware encoders and telemetry.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            IrProtocol::Samsung => 0x01,
            IrProtocol::Nec => 0x02,
            IrProtocol::Sony => 0x03,
            IrProtocol::Rc6 => 0x04,
            IrProtocol::Sharp => 0x05,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(IrProtocol::Samsung),
            0x02 => Some(IrProtocol::Nec),
            0x03 => Some(IrProtocol::Sony),
            0x04 => Some(IrProtocol::Rc6),
            0x05 => Some(IrProtocol::Sharp),
            _ => None,
        }
    }
}

impl fmt::Display for IrProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IrProtocol::Samsung => "samsung",
            IrProtocol::Nec => "nec",
            IrProtocol::Sony => "sony",
            IrProtocol::Rc6 => "rc6",
            IrProtocol::Sharp => "sharp",
        })
    }
}

/// One entry of the emission table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EmissionPattern {
    pub protocol: IrProtocol,
    pub code: u64,
    pub bits: u16,
}

impl EmissionPattern {
    #[must_use]
    pub const fn new(protocol: IrProtocol, code: u64, bits: u16) -> Self {
        Self {
            protocol,
            code,
            bits,
        }
    }
}

/// Power codes for common television brands, emitted in table order.
pub const POWER_CODES: [EmissionPattern; 21] = [
    EmissionPattern::new(IrProtocol::Samsung, 0xE0E0_40BF, 32),
    EmissionPattern::new(IrProtocol::Samsung, 0xE0E0_19E6, 32),
    EmissionPattern::new(IrProtocol::Samsung, 0xE0E0_E01F, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x20DF_10EF, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x20DF_23DC, 32),
    EmissionPattern::new(IrProtocol::Sony, 0xA90, 12),
    EmissionPattern::new(IrProtocol::Sony, 0x1_0A90, 20),
    EmissionPattern::new(IrProtocol::Nec, 0x4004_0100_BCBD, 32),
    EmissionPattern::new(IrProtocol::Rc6, 0xC, 20),
    EmissionPattern::new(IrProtocol::Rc6, 0x10C, 20),
    EmissionPattern::new(IrProtocol::Sharp, 0xB54A, 15),
    EmissionPattern::new(IrProtocol::Sharp, 0xAA5A, 15),
    EmissionPattern::new(IrProtocol::Nec, 0x02FD_48B7, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x02FD_807F, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x20DF_10EF, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x20DF_3EC1, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x20DF_40BF, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x25D8_C43B, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x57E3_18E7, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x57E3_16E9, 32),
    EmissionPattern::new(IrProtocol::Nec, 0x57E3_E817, 32),
];

/// Result of emitting one pattern.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EmissionStep {
    /// Table index that was transmitted.
    pub index: usize,
    /// `true` when this step finished a full pass over the table.
    pub completed_cycle: bool,
}

/// Position within an emission table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EmissionCursor {
    pattern_index: usize,
    total_patterns: usize,
}

impl EmissionCursor {
    #[must_use]
    pub const fn new(total_patterns: usize) -> Self {
        Self {
            pattern_index: 0,
            total_patterns,
        }
    }

    #[must_use]
    pub const fn pattern_index(&self) -> usize {
        self.pattern_index
    }

    #[must_use]
    pub const fn total_patterns(&self) -> usize {
        self.total_patterns
    }

    pub fn reset(&mut self) {
        self.pattern_index = 0;
    }

    /// Returns the current index and moves to the next one, wrapping at the
    /// end of the table. `None` for an empty table.
    pub fn advance(&mut self) -> Option<usize> {
        if self.total_patterns == 0 {
            return None;
        }
        let current = self.pattern_index;
        self.pattern_index = (current + 1) % self.total_patterns;
        Some(current)
    }

    /// Hands the pattern under the cursor to `emitter` and advances.
    pub fn emit_next<E: PatternEmitter>(
        &mut self,
        table: &[EmissionPattern],
        emitter: &mut E,
    ) -> Option<EmissionStep> {
        let index = self.advance()?;
        let pattern = table.get(index)?;
        emitter.transmit(pattern);
        Some(EmissionStep {
            index,
            completed_cycle: self.pattern_index == 0,
        })
    }
}
