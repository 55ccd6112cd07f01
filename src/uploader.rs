//! Forwarding of decoded records to the ingestion endpoint.
//!
//! The endpoint is a plain HTTP+JSON append API. On success it answers
//! `"OK"`; a token mismatch is answered with a rejection text body (and a
//! success status), so the body has to be inspected as well as the status.

use serde::Serialize;
use thiserror::Error;
use tokio::time::Duration;

use crate::record::MeasurementRecord;

/// An upload that did not result in the record being stored. The record is
/// lost; there is no local retry queue.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ingestion endpoint returned HTTP {0}")]
    Status(u16),
    #[error("ingestion endpoint rejected the token")]
    AuthRejected,
}

/// The wire format of the append operation.
#[derive(Serialize)]
struct UploadPayload<'a> {
    token: &'a str,
    datetime: &'a str,
    weight: f64,
    impedance: u16,
    fat_percentage: f64,
}

pub struct UploadSink {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl UploadSink {
    const REQUEST_TIMEOUT_S: u64 = 10;

    pub fn new(url: &str, token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::REQUEST_TIMEOUT_S))
            .build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            token: token.to_string(),
        })
    }

    /// POST one record to the endpoint. One attempt, no retry.
    pub async fn upload(&self, record: &MeasurementRecord) -> Result<(), UploadError> {
        let payload = UploadPayload {
            token: &self.token,
            datetime: &record.datetime,
            weight: record.weight_kg,
            impedance: record.impedance,
            fat_percentage: record.fat_percentage,
        };

        let response = self.http.post(&self.url).json(&payload).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        classify_response(status, &body)
    }
}

fn classify_response(status: u16, body: &str) -> Result<(), UploadError> {
    if !(200..300).contains(&status) {
        return Err(UploadError::Status(status));
    }
    if body.trim() != "OK" {
        return Err(UploadError::AuthRejected);
    }
    Ok(())
}

#[test]
fn test_classify_response_ok() {
    assert!(classify_response(200, "OK").is_ok());
}

#[test]
fn test_classify_response_server_error() {
    assert!(matches!(
        classify_response(500, "boom"),
        Err(UploadError::Status(500))
    ));
}

#[test]
fn test_classify_response_token_rejected() {
    // The endpoint answers a rejection text with a success status
    assert!(matches!(
        classify_response(200, "go away"),
        Err(UploadError::AuthRejected)
    ));
}

#[test]
fn test_payload_wire_format() {
    let payload = UploadPayload {
        token: "testtest",
        datetime: "2020-09-08 21:39:07",
        weight: 35.30,
        impedance: 468,
        fat_percentage: 12.5,
    };
    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["token"], "testtest");
    assert_eq!(value["datetime"], "2020-09-08 21:39:07");
    assert_eq!(value["weight"], 35.30);
    assert_eq!(value["impedance"], 468);
    assert_eq!(value["fat_percentage"], 12.5);
}
