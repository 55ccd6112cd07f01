//! The history session state machine.
//!
//! One `SessionConsumer` drives one connect→drain→disconnect cycle. It is
//! fed frames from the transport's notification queue one at a time and
//! answers with a [`Step`] telling the driver what to do next, so the
//! protocol logic itself never touches the transport and can be tested
//! against synthetic frames.

use crate::config::UserProfile;
use crate::frame::{self, COUNT_FRAME_LEN, END_OF_HISTORY, RECORD_FRAME_LEN};
use crate::record::MeasurementRecord;

/// Command written to the history characteristic to request the stored
/// record count
pub const CMD_REQUEST_COUNT: [u8; 5] = [0x01, 0xff, 0xff, 0xff, 0xff];
/// Command written to the history characteristic to request the next record
pub const CMD_REQUEST_NEXT: [u8; 1] = [0x02];
/// Command written to the history characteristic to acknowledge the end of
/// the history
pub const CMD_ACK_END: [u8; 1] = [0x03];

/// One element of the session queue: a notification frame, or the sentinel
/// marking that the stream has shut down.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionInput {
    Frame(Vec<u8>),
    Shutdown,
}

/// Where the consumer is in the history protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session not started yet
    Idle,
    /// Count request sent, waiting for the 7 byte count frame
    AwaitingCount,
    /// Records requested, consuming 13 byte record frames
    StreamingRecords,
    /// End-of-history seen, waiting for the driver to acknowledge it
    Draining,
    /// Session over, no further input is acted on
    Closed,
}

/// What the session driver must do after feeding one input to the consumer.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Nothing; keep waiting on the queue
    Continue,
    /// Write this command to the history characteristic
    Write(&'static [u8]),
    /// Upload this decoded record, then keep waiting
    Publish(MeasurementRecord),
    /// Session over. If `ack` is set, write [`CMD_ACK_END`] and call
    /// [`SessionConsumer::finish`] before tearing down.
    Close { ack: bool },
}

pub struct SessionConsumer {
    state: SessionState,
    profile: UserProfile,
}

impl SessionConsumer {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            state: SessionState::Idle,
            profile,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start the session. Returns the count request command, which the
    /// driver must write once notifications are enabled.
    pub fn start(&mut self) -> &'static [u8] {
        self.state = SessionState::AwaitingCount;
        &CMD_REQUEST_COUNT
    }

    /// Mark the session closed after the driver has written the final
    /// acknowledgement.
    pub fn finish(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Feed one queue element through the state machine.
    pub fn on_input(&mut self, input: SessionInput) -> Step {
        match input {
            SessionInput::Shutdown => {
                // Stream torn down underneath us; close without writes
                self.state = SessionState::Closed;
                Step::Close { ack: false }
            }
            SessionInput::Frame(frame) => self.on_frame(&frame),
        }
    }

    fn on_frame(&mut self, frame: &[u8]) -> Step {
        match (self.state, frame.len()) {
            (SessionState::AwaitingCount, COUNT_FRAME_LEN) => {
                let count = frame::decode_count(frame);
                log::info!("device reports {count} stored records");
                if count > 0 {
                    self.state = SessionState::StreamingRecords;
                    Step::Write(&CMD_REQUEST_NEXT)
                } else {
                    self.state = SessionState::Closed;
                    Step::Close { ack: false }
                }
            }
            (SessionState::StreamingRecords, RECORD_FRAME_LEN) => {
                match frame::decode_record(frame, &self.profile) {
                    Ok(record) => Step::Publish(record),
                    Err(err) => {
                        // Malformed record: drop it, keep draining
                        log::warn!("dropping record frame {}: {err}", hex::encode(frame));
                        Step::Continue
                    }
                }
            }
            (SessionState::StreamingRecords, 1) if frame[0] == END_OF_HISTORY => {
                self.state = SessionState::Draining;
                Step::Close { ack: true }
            }
            _ => {
                // The device emits frames for states we don't handle;
                // ignoring them is deliberate.
                log::debug!("ignoring frame {}", hex::encode(frame));
                Step::Continue
            }
        }
    }
}

#[cfg(test)]
use crate::frame::{encode_record_frame, test_profile};

#[cfg(test)]
fn started_consumer() -> SessionConsumer {
    let mut consumer = SessionConsumer::new(test_profile());
    assert_eq!(consumer.start(), &CMD_REQUEST_COUNT[..]);
    consumer
}

#[cfg(test)]
fn count_frame(count: u16) -> SessionInput {
    let c = count.to_le_bytes();
    SessionInput::Frame(vec![0x00, c[0], c[1], 0x00, 0x00, 0x00, 0x00])
}

#[test]
fn test_zero_count_closes_without_request_next() {
    let mut consumer = started_consumer();
    let step = consumer.on_input(count_frame(0));
    assert_eq!(step, Step::Close { ack: false });
    assert_eq!(consumer.state(), SessionState::Closed);
}

#[test]
fn test_positive_count_requests_next_record() {
    let mut consumer = started_consumer();
    let step = consumer.on_input(count_frame(3));
    assert_eq!(step, Step::Write(&CMD_REQUEST_NEXT));
    assert_eq!(consumer.state(), SessionState::StreamingRecords);
}

#[test]
fn test_record_frame_is_published() {
    let mut consumer = started_consumer();
    consumer.on_input(count_frame(1));
    let frame = encode_record_frame(0x02, 2020, 9, 8, 21, 39, 7, 468, 7060);
    let step = consumer.on_input(SessionInput::Frame(frame.to_vec()));
    match step {
        Step::Publish(record) => {
            assert_eq!(record.weight_kg, 35.30);
            assert_eq!(record.impedance, 468);
        }
        other => panic!("expected Publish, got {other:?}"),
    }
    assert_eq!(consumer.state(), SessionState::StreamingRecords);
}

#[test]
fn test_malformed_record_is_dropped_and_session_continues() {
    let mut consumer = started_consumer();
    consumer.on_input(count_frame(1));
    // No unit bit set
    let frame = encode_record_frame(0x00, 2020, 9, 8, 21, 39, 7, 468, 7060);
    let step = consumer.on_input(SessionInput::Frame(frame.to_vec()));
    assert_eq!(step, Step::Continue);
    assert_eq!(consumer.state(), SessionState::StreamingRecords);
}

#[test]
fn test_end_of_history_closes_with_ack() {
    let mut consumer = started_consumer();
    consumer.on_input(count_frame(1));
    let step = consumer.on_input(SessionInput::Frame(vec![END_OF_HISTORY]));
    assert_eq!(step, Step::Close { ack: true });
    assert_eq!(consumer.state(), SessionState::Draining);
    consumer.finish();
    assert_eq!(consumer.state(), SessionState::Closed);
}

#[test]
fn test_shutdown_sentinel_closes_without_ack() {
    let mut consumer = started_consumer();
    consumer.on_input(count_frame(1));
    let step = consumer.on_input(SessionInput::Shutdown);
    assert_eq!(step, Step::Close { ack: false });
    assert_eq!(consumer.state(), SessionState::Closed);
}

#[test]
fn test_unrecognized_frames_are_ignored() {
    let mut consumer = started_consumer();
    // A record frame before the count frame matches no transition
    let frame = encode_record_frame(0x02, 2020, 9, 8, 21, 39, 7, 468, 7060);
    assert_eq!(
        consumer.on_input(SessionInput::Frame(frame.to_vec())),
        Step::Continue
    );
    assert_eq!(consumer.state(), SessionState::AwaitingCount);

    consumer.on_input(count_frame(1));
    // Odd lengths and non-terminator single bytes are ignored too
    assert_eq!(
        consumer.on_input(SessionInput::Frame(vec![0x01, 0x02, 0x03])),
        Step::Continue
    );
    assert_eq!(
        consumer.on_input(SessionInput::Frame(vec![0x04])),
        Step::Continue
    );
    assert_eq!(consumer.state(), SessionState::StreamingRecords);
}
