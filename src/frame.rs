//! Decoding of the raw notification frames the scale delivers during a
//! history session.
//!
//! Frames are untyped byte buffers; their meaning is determined solely by
//! length. A 7 byte frame carries the stored record count, a 13 byte frame
//! carries one measurement record, and a single `0x03` byte marks the end
//! of the history.
//!
//! Record frame layout (all integers little endian):
//!
//! Byte  | Meaning
//! 0     | control byte (see the `UNIT_*` / flag bits below)
//! 2-3   | year
//! 4     | month
//! 5     | day
//! 6     | hour
//! 7     | minute
//! 8     | second
//! 9-10  | impedance (ohms)
//! 11-12 | weight magnitude, in units of 0.01 of the configured display unit

use crate::composition;
use crate::config::UserProfile;
use crate::error::DecodeError;
use crate::record::MeasurementRecord;

/// Length of a frame carrying the stored record count
pub const COUNT_FRAME_LEN: usize = 7;
/// Length of a frame carrying one measurement record
pub const RECORD_FRAME_LEN: usize = 13;
/// Value of the single-byte end-of-history marker frame
pub const END_OF_HISTORY: u8 = 0x03;

const UNIT_KG: u8 = 1 << 1;
const UNIT_LBS: u8 = 1 << 2;
const UNIT_JIN: u8 = 1 << 3;
/// Informational only, not required for decoding
#[allow(dead_code)]
const FLAG_STABILIZED: u8 = 1 << 5;
/// Informational only, not required for decoding
#[allow(dead_code)]
const FLAG_LOAD_REMOVED: u8 = 1 << 7;
// Bits 4 and 6 are also observed on the wire but their meaning is unknown;
// they are treated as reserved and ignored.

/// The display unit the scale was configured to when the record was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightUnit {
    Kilogram,
    Pound,
    Jin,
}

impl WeightUnit {
    /// Classify the unit bits of a record control byte. Exactly one of the
    /// three unit bits must be set for the weight field to be meaningful.
    fn from_control_byte(control: u8) -> Result<Self, DecodeError> {
        let units = [
            (control & UNIT_KG != 0, WeightUnit::Kilogram),
            (control & UNIT_LBS != 0, WeightUnit::Pound),
            (control & UNIT_JIN != 0, WeightUnit::Jin),
        ];
        let mut set = units.iter().filter(|(bit, _)| *bit).map(|(_, unit)| *unit);
        match (set.next(), set.next()) {
            (Some(unit), None) => Ok(unit),
            (None, _) => Err(DecodeError::NoUnit(control)),
            (Some(_), Some(_)) => Err(DecodeError::AmbiguousUnit(control)),
        }
    }

    /// Conversion factor from the raw magnitude (already scaled by 0.01)
    /// to kilograms.
    fn to_kg_factor(self) -> f64 {
        match self {
            WeightUnit::Kilogram => 0.50,
            WeightUnit::Pound => 0.4536,
            WeightUnit::Jin => 0.25,
        }
    }
}

/// Decode one 13 byte record frame into a [`MeasurementRecord`], deriving
/// the fat percentage from the given user profile.
pub fn decode_record(
    frame: &[u8],
    profile: &UserProfile,
) -> Result<MeasurementRecord, DecodeError> {
    if frame.len() != RECORD_FRAME_LEN {
        return Err(DecodeError::Length(frame.len()));
    }

    let unit = WeightUnit::from_control_byte(frame[0])?;

    // Scale to display units first, then convert to kg. The order matters:
    // the 2-decimal rounding is applied to the converted value.
    let magnitude = f64::from(u16::from_le_bytes([frame[11], frame[12]])) * 0.01;
    let weight_kg = round2(magnitude * unit.to_kg_factor());

    let impedance = u16::from_le_bytes([frame[9], frame[10]]);

    let year = u16::from_le_bytes([frame[2], frame[3]]);
    let (month, day, hour, minute, second) =
        (frame[4], frame[5], frame[6], frame[7], frame[8]);
    // Calendar fields are passed through unvalidated, as the device sends them
    let datetime =
        format!("{year}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");

    let fat_percentage = composition::fat_percentage(profile, weight_kg, impedance);

    Ok(MeasurementRecord {
        datetime,
        weight_kg,
        impedance,
        fat_percentage,
    })
}

/// Decode the stored record count from a 7 byte count frame.
pub fn decode_count(frame: &[u8]) -> u16 {
    u16::from_le_bytes([frame[1], frame[2]])
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
use crate::config::Sex;

#[cfg(test)]
pub(crate) fn test_profile() -> UserProfile {
    UserProfile {
        sex: Sex::Male,
        age: 20,
        height_cm: 180.0,
    }
}

/// Build a synthetic record frame from field values, for tests.
#[cfg(test)]
pub(crate) fn encode_record_frame(
    control: u8,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    impedance: u16,
    raw_weight: u16,
) -> [u8; RECORD_FRAME_LEN] {
    let y = year.to_le_bytes();
    let i = impedance.to_le_bytes();
    let w = raw_weight.to_le_bytes();
    [
        control, 0x00, y[0], y[1], month, day, hour, minute, second, i[0], i[1], w[0], w[1],
    ]
}

#[test]
fn test_decode_record_kg() {
    // Raw magnitude 7060 scales to 70.60, then the kg factor halves it.
    // Swapping the scale and convert stages would change the result.
    let frame = encode_record_frame(0x02, 2020, 9, 8, 21, 39, 7, 468, 7060);
    let record = decode_record(&frame, &test_profile()).unwrap();
    assert_eq!(record.weight_kg, 35.30);
    assert_eq!(record.impedance, 468);
    assert_eq!(record.datetime, "2020-09-08 21:39:07");
}

#[test]
fn test_decode_record_lbs() {
    let frame = encode_record_frame(0x04, 2021, 1, 2, 3, 4, 5, 500, 12345);
    let record = decode_record(&frame, &test_profile()).unwrap();
    // 123.45 lbs * 0.4536 = 55.99692, rounded to 2 decimals
    assert_eq!(record.weight_kg, 56.00);
}

#[test]
fn test_decode_record_jin() {
    let frame = encode_record_frame(0x08, 2021, 1, 2, 3, 4, 5, 500, 10000);
    let record = decode_record(&frame, &test_profile()).unwrap();
    assert_eq!(record.weight_kg, 25.00);
}

#[test]
fn test_decode_record_informational_flags_ignored() {
    // Stabilized + load removed + kg unit still decodes
    let frame = encode_record_frame(0x02 | 0x20 | 0x80, 2021, 1, 2, 3, 4, 5, 500, 7060);
    let record = decode_record(&frame, &test_profile()).unwrap();
    assert_eq!(record.weight_kg, 35.30);
}

#[test]
fn test_decode_record_no_unit_bit() {
    let frame = encode_record_frame(0x00, 2021, 1, 2, 3, 4, 5, 500, 7060);
    let result = decode_record(&frame, &test_profile());
    assert_eq!(result, Err(DecodeError::NoUnit(0x00)));
}

#[test]
fn test_decode_record_two_unit_bits() {
    let frame = encode_record_frame(0x06, 2021, 1, 2, 3, 4, 5, 500, 7060);
    let result = decode_record(&frame, &test_profile());
    assert_eq!(result, Err(DecodeError::AmbiguousUnit(0x06)));
}

#[test]
fn test_decode_record_wrong_length() {
    let result = decode_record(&[0x02, 0x00], &test_profile());
    assert_eq!(result, Err(DecodeError::Length(2)));
}

#[test]
fn test_decode_record_passes_calendar_through() {
    // Month 13, hour 25: out of range, passed through verbatim
    let frame = encode_record_frame(0x02, 2021, 13, 32, 25, 61, 61, 500, 7060);
    let record = decode_record(&frame, &test_profile()).unwrap();
    assert_eq!(record.datetime, "2021-13-32 25:61:61");
}

#[test]
fn test_record_round_trip() {
    let frame = encode_record_frame(0x02, 2023, 6, 15, 12, 0, 30, 431, 14120);
    let record = decode_record(&frame, &test_profile()).unwrap();
    assert!((record.weight_kg - 70.60).abs() < 0.01);
    assert_eq!(record.impedance, 431);
}

#[test]
fn test_decode_count() {
    assert_eq!(decode_count(&[0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00]), 5);
    assert_eq!(decode_count(&[0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00]), 0x0201);
    assert_eq!(decode_count(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]), 0);
}
