use thiserror::Error;

/// A 13 byte record frame that could not be decoded.
///
/// Decode failures are contained per record: the frame is dropped and the
/// session keeps consuming.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record frame must be 13 bytes, got {0}")]
    Length(usize),
    #[error("no weight unit bit set in control byte {0:#04x}")]
    NoUnit(u8),
    #[error("more than one weight unit bit set in control byte {0:#04x}")]
    AmbiguousUnit(u8),
}
