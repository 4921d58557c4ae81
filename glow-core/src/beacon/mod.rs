//! Beacon rotation: payload tables, address and power randomisation.
//!
//! Each rotation picks one of four payload categories and one payload within
//! it, generates a fresh random address, picks an advertising kind and a
//! transmit power step, and reprograms the radio. The payload tables are
//! plain advertisement data (length/type/value structures) and are opaque to
//! everything else in the crate.

use core::{fmt, time::Duration};

use rand_core::RngCore;

use crate::collaborators::BeaconRadio;
use crate::time::Instant;

/// Manufacturer-specific data under the Bluetooth SIG test company identifier.
pub const TEST_MANUFACTURER_PAYLOADS: [&[u8]; 3] = [
    &[0x02, 0x01, 0x06, 0x07, 0xFF, 0xFF, 0xFF, b'G', b'L', b'O', 0x01],
    &[0x02, 0x01, 0x06, 0x07, 0xFF, 0xFF, 0xFF, b'G', b'L', b'O', 0x02],
    &[0x02, 0x01, 0x06, 0x07, 0xFF, 0xFF, 0xFF, b'G', b'L', b'O', 0x03],
];

/// Eddystone-UID frames with a fixed namespace and per-entry instance.
pub const EDDYSTONE_UID_PAYLOADS: [&[u8]; 2] = [
    &[
        0x02, 0x01, 0x06, 0x03, 0x03, 0xAA, 0xFE, 0x15, 0x16, 0xAA, 0xFE, 0x00, 0xEE, 0x67, 0x6C,
        0x6F, 0x77, 0x2D, 0x72, 0x65, 0x6D, 0x6F, 0x74, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
    ],
    &[
        0x02, 0x01, 0x06, 0x03, 0x03, 0xAA, 0xFE, 0x15, 0x16, 0xAA, 0xFE, 0x00, 0xEE, 0x67, 0x6C,
        0x6F, 0x77, 0x2D, 0x72, 0x65, 0x6D, 0x6F, 0x74, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ],
];

/// Eddystone-URL frames pointing at `https://example.{com,org,net}`.
pub const EDDYSTONE_URL_PAYLOADS: [&[u8]; 3] = [
    &[
        0x02, 0x01, 0x06, 0x03, 0x03, 0xAA, 0xFE, 0x0E, 0x16, 0xAA, 0xFE, 0x10, 0xEE, 0x03, b'e',
        b'x', b'a', b'm', b'p', b'l', b'e', 0x07,
    ],
    &[
        0x02, 0x01, 0x06, 0x03, 0x03, 0xAA, 0xFE, 0x0E, 0x16, 0xAA, 0xFE, 0x10, 0xEE, 0x03, b'e',
        b'x', b'a', b'm', b'p', b'l', b'e', 0x08,
    ],
    &[
        0x02, 0x01, 0x06, 0x03, 0x03, 0xAA, 0xFE, 0x0E, 0x16, 0xAA, 0xFE, 0x10, 0xEE, 0x03, b'e',
        b'x', b'a', b'm', b'p', b'l', b'e', 0x09,
    ],
];

/// Complete local name frames.
pub const LOCAL_NAME_PAYLOADS: [&[u8]; 2] = [
    &[0x02, 0x01, 0x06, 0x07, 0x09, b'G', b'l', b'o', b'w', b' ', b'A'],
    &[0x02, 0x01, 0x06, 0x07, 0x09, b'G', b'l', b'o', b'w', b' ', b'B'],
];

/// Payload family picked on each rotation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BeaconCategory {
    #[default]
    TestManufacturer,
    EddystoneUid,
    EddystoneUrl,
    LocalName,
}

impl BeaconCategory {
    pub const ALL: [BeaconCategory; 4] = [
        BeaconCategory::TestManufacturer,
        BeaconCategory::EddystoneUid,
        BeaconCategory::EddystoneUrl,
        BeaconCategory::LocalName,
    ];

    /// Static payload set of this category.
    #[must_use]
    pub const fn payloads(self) -> &'static [&'static [u8]] {
        match self {
            BeaconCategory::TestManufacturer => &TEST_MANUFACTURER_PAYLOADS,
            BeaconCategory::EddystoneUid => &EDDYSTONE_UID_PAYLOADS,
            BeaconCategory::EddystoneUrl => &EDDYSTONE_URL_PAYLOADS,
            BeaconCategory::LocalName => &LOCAL_NAME_PAYLOADS,
        }
    }

    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            BeaconCategory::TestManufacturer => 0,
            BeaconCategory::EddystoneUid => 1,
            BeaconCategory::EddystoneUrl => 2,
            BeaconCategory::LocalName => 3,
        }
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(BeaconCategory::TestManufacturer),
            1 => Some(BeaconCategory::EddystoneUid),
            2 => Some(BeaconCategory::EddystoneUrl),
            3 => Some(BeaconCategory::LocalName),
            _ => None,
        }
    }
}

impl fmt::Display for BeaconCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BeaconCategory::TestManufacturer => "manufacturer",
            BeaconCategory::EddystoneUid => "eddystone-uid",
            BeaconCategory::EddystoneUrl => "eddystone-url",
            BeaconCategory::LocalName => "local-name",
        })
    }
}

/// Random static device address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BeaconAddress(pub [u8; 6]);

impl BeaconAddress {
    /// Draws a fresh address. The top nibble of the first byte is always set.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 6];
        rng.fill_bytes(&mut bytes);
        bytes[0] |= 0xF0;
        Self(bytes)
    }

    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for BeaconAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, octet) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            write!(f, "{octet:02X}")?;
        }
        Ok(())
    }
}

/// Advertising PDU kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AdvertisingKind {
    Connectable,
    Scannable,
    NonConnectable,
}

impl AdvertisingKind {
    /// Picks one of the three kinds with equal probability.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        match rng.next_u32() % 3 {
            0 => AdvertisingKind::Connectable,
            1 => AdvertisingKind::Scannable,
            _ => AdvertisingKind::NonConnectable,
        }
    }
}

/// Transmit power expressed as steps below the radio's maximum.
///
/// Step 0 is full power; the radio maps steps to its own power table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct TxPowerStep(u8);

impl TxPowerStep {
    pub const MAX: TxPowerStep = TxPowerStep(0);
    pub const LOWEST: TxPowerStep = TxPowerStep(4);

    #[must_use]
    pub const fn new(steps_below_max: u8) -> Option<Self> {
        if steps_below_max <= Self::LOWEST.0 {
            Some(Self(steps_below_max))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn steps_below_max(self) -> u8 {
        self.0
    }

    /// Maps a roll in `0..100` onto the power distribution:
    /// 70% full power, then 15%, 10%, 4% and 1% for each lower step.
    #[must_use]
    pub const fn from_percentile(roll: u32) -> Self {
        let steps = match roll {
            0..70 => 0,
            70..85 => 1,
            85..95 => 2,
            95..99 => 3,
            _ => 4,
        };
        Self(steps)
    }

    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        Self::from_percentile(rng.next_u32() % 100)
    }
}

/// Everything programmed into the radio by one rotation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BeaconRotation {
    pub category: BeaconCategory,
    pub payload_index: usize,
    pub address: BeaconAddress,
    pub kind: AdvertisingKind,
    pub power: TxPowerStep,
    pub at: Instant,
    /// `true` for the first rotation after a reset.
    pub first_in_session: bool,
}

/// Uniform-enough pick in `0..len` for the small tables above. `len` must be non-zero.
fn pick_index<R: RngCore>(rng: &mut R, len: usize) -> usize {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    usize::try_from(rng.next_u32() % len).unwrap_or(0)
}

/// Rotation bookkeeping owned by the scheduler.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BeaconCursor {
    category: BeaconCategory,
    last_rotation_at: Option<Instant>,
}

impl BeaconCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            category: BeaconCategory::TestManufacturer,
            last_rotation_at: None,
        }
    }

    #[must_use]
    pub const fn category(&self) -> BeaconCategory {
        self.category
    }

    #[must_use]
    pub const fn last_rotation_at(&self) -> Option<Instant> {
        self.last_rotation_at
    }

    /// Clears the rotation timestamp so the next check is due immediately.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Returns `true` when no rotation has happened yet or `interval` has
    /// elapsed since the last one.
    #[must_use]
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        self.last_rotation_at
            .is_none_or(|last| now.has_elapsed(last, interval))
    }

    /// Reprograms the radio with a freshly randomised beacon.
    pub fn rotate<R: RngCore, B: BeaconRadio>(
        &mut self,
        now: Instant,
        rng: &mut R,
        radio: &mut B,
    ) -> BeaconRotation {
        let category = BeaconCategory::ALL[pick_index(rng, BeaconCategory::ALL.len())];
        let payloads = category.payloads();
        let payload_index = pick_index(rng, payloads.len());
        let address = BeaconAddress::random(rng);
        let kind = AdvertisingKind::random(rng);
        let power = TxPowerStep::random(rng);
        let first_in_session = self.last_rotation_at.is_none();

        radio.stop();
        radio.set_address(address);
        radio.set_advertising_kind(kind);
        radio.set_advertisement_payload(payloads[payload_index]);
        radio.start();
        radio.set_tx_power(power);

        self.category = category;
        self.last_rotation_at = Some(now);

        BeaconRotation {
            category,
            payload_index,
            address,
            kind,
            power,
            at: now,
            first_in_session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::BringUpError;
    use heapless::Vec;
    use rand::{SeedableRng, rngs::SmallRng};

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum RadioCall {
        Stop,
        Address,
        Kind,
        Payload(usize),
        Start,
        Power,
    }

    #[derive(Default)]
    struct RecordingRadio {
        calls: Vec<RadioCall, 16>,
    }

    impl BeaconRadio for RecordingRadio {
        fn bring_up(&mut self) -> Result<(), BringUpError> {
            Ok(())
        }

        fn set_address(&mut self, _: BeaconAddress) {
            self.calls.push(RadioCall::Address).ok();
        }

        fn set_advertisement_payload(&mut self, payload: &[u8]) {
            self.calls.push(RadioCall::Payload(payload.len())).ok();
        }

        fn set_advertising_kind(&mut self, _: AdvertisingKind) {
            self.calls.push(RadioCall::Kind).ok();
        }

        fn set_tx_power(&mut self, _: TxPowerStep) {
            self.calls.push(RadioCall::Power).ok();
        }

        fn start(&mut self) {
            self.calls.push(RadioCall::Start).ok();
        }

        fn stop(&mut self) {
            self.calls.push(RadioCall::Stop).ok();
        }
    }

    #[test]
    fn payloads_are_well_formed_advertising_data() {
        for category in BeaconCategory::ALL {
            for payload in category.payloads() {
                assert!(payload.len() <= 31, "{category} payload too long");
                let mut offset = 0;
                while offset < payload.len() {
                    let length = payload[offset] as usize;
                    assert!(length > 0);
                    offset += length + 1;
                }
                assert_eq!(offset, payload.len(), "{category} structure overruns");
            }
        }
    }

    #[test]
    fn addresses_always_have_top_nibble_set() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..256 {
            let address = BeaconAddress::random(&mut rng);
            assert_eq!(address.octets()[0] & 0xF0, 0xF0);
        }
    }

    #[test]
    fn address_displays_as_colon_separated_hex() {
        let address = BeaconAddress([0xF1, 0x02, 0xAB, 0x00, 0x10, 0xFF]);
        let mut text = heapless::String::<17>::new();
        core::fmt::write(&mut text, format_args!("{address}")).unwrap();
        assert_eq!(text.as_str(), "F1:02:AB:00:10:FF");
    }

    #[test]
    fn picks_stay_inside_each_table() {
        let mut rng = SmallRng::seed_from_u64(3);
        for category in BeaconCategory::ALL {
            let len = category.payloads().len();
            for _ in 0..64 {
                assert!(pick_index(&mut rng, len) < len);
            }
        }
    }

    #[test]
    fn power_distribution_boundaries() {
        assert_eq!(TxPowerStep::from_percentile(0), TxPowerStep::MAX);
        assert_eq!(TxPowerStep::from_percentile(69).steps_below_max(), 0);
        assert_eq!(TxPowerStep::from_percentile(70).steps_below_max(), 1);
        assert_eq!(TxPowerStep::from_percentile(84).steps_below_max(), 1);
        assert_eq!(TxPowerStep::from_percentile(85).steps_below_max(), 2);
        assert_eq!(TxPowerStep::from_percentile(94).steps_below_max(), 2);
        assert_eq!(TxPowerStep::from_percentile(95).steps_below_max(), 3);
        assert_eq!(TxPowerStep::from_percentile(98).steps_below_max(), 3);
        assert_eq!(TxPowerStep::from_percentile(99), TxPowerStep::LOWEST);
        assert!(TxPowerStep::new(5).is_none());
    }

    #[test]
    fn rotation_reprograms_radio_in_order() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut radio = RecordingRadio::default();
        let mut cursor = BeaconCursor::new();
        let now = Instant::from_millis(500);

        assert!(cursor.is_due(now, Duration::from_millis(30)));
        let rotation = cursor.rotate(now, &mut rng, &mut radio);

        let payload_len = rotation.category.payloads()[rotation.payload_index].len();
        assert_eq!(
            radio.calls.as_slice(),
            &[
                RadioCall::Stop,
                RadioCall::Address,
                RadioCall::Kind,
                RadioCall::Payload(payload_len),
                RadioCall::Start,
                RadioCall::Power,
            ]
        );
        assert!(rotation.first_in_session);
        assert_eq!(cursor.category(), rotation.category);
        assert_eq!(cursor.last_rotation_at(), Some(now));
        assert!(!cursor.is_due(Instant::from_millis(529), Duration::from_millis(30)));
        assert!(cursor.is_due(Instant::from_millis(530), Duration::from_millis(30)));

        cursor.reset();
        assert!(cursor.is_due(Instant::from_millis(531), Duration::from_millis(30)));
    }

    #[test]
    fn every_category_is_eventually_chosen() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut radio = RecordingRadio::default();
        let mut cursor = BeaconCursor::new();
        let mut seen = [false; 4];
        for tick in 0..200 {
            let rotation = cursor.rotate(Instant::from_millis(tick * 30), &mut rng, &mut radio);
            seen[rotation.category.as_index() as usize] = true;
            radio.calls.clear();
        }
        assert!(seen.iter().all(|hit| *hit));
    }
}
