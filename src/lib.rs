//! Read the stored weight history from a Xiaomi body composition scale over
//! Bluetooth Low Energy and forward it to an HTTP ingestion endpoint.
//!
//! Tested with a Mi Body Composition Scale 2 (advertises as `MIBCS`).
//!
//! The scale keeps measurements taken while no phone was nearby in an
//! on-device history, reachable through a vendor characteristic on the
//! standard body composition service. The history protocol is notification
//! based and has been reverse engineered: after a count request the device
//! streams one 13 byte frame per stored record and ends with a single
//! `0x03` byte, which the client acknowledges.
//!
//! Each record is decoded into weight (kg), bio-impedance (ohms) and a
//! timestamp, a body fat percentage is derived from the configured user
//! profile, and the result is POSTed to the ingestion endpoint.
//!
//! # Example
//!
//! ```no_run
//! # #[tokio::main]
//! # pub async fn main() -> anyhow::Result<()> {
//!     let config = scaleread::Config::from_env()?;
//!     // Connect, drain and upload on the day-partitioned schedule, forever.
//!     scaleread::scheduler::run(config).await
//! # }
//! ```

mod composition;
mod config;
mod error;
mod frame;
mod record;
mod scale_client;
pub mod scheduler;
mod session;
mod uploader;

pub use config::{Config, Sex, UserProfile};
pub use error::DecodeError;
pub use record::MeasurementRecord;
pub use scale_client::ScaleClient;
pub use session::{SessionConsumer, SessionInput, SessionState, Step};
pub use uploader::{UploadError, UploadSink};
