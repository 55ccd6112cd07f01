//! The day-partitioned wake/sleep loop that drives repeated history
//! sessions.
//!
//! Two fixed windows per day matter: the scale is typically used in the
//! morning and in the evening, so the process wakes at 08:00 and 21:00 and
//! polls every minute while inside a window. Session failures are logged
//! and absorbed; the loop never terminates.

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::time::Duration;

use crate::config::Config;
use crate::scale_client::ScaleClient;
use crate::uploader::UploadSink;

/// Compute the next session start from the current local time.
///
/// Before 08:00 the next wake is 08:00 today; between 10:00 and 21:00 it is
/// 21:00 today; inside a polling window (08:00-10:00 and from 21:00) it is
/// one minute from now.
pub fn next_wake(now: NaiveDateTime) -> NaiveDateTime {
    let hour = now.hour();
    if hour < 8 {
        now.date().and_hms_opt(8, 0, 0).unwrap()
    } else if (10..21).contains(&hour) {
        now.date().and_hms_opt(21, 0, 0).unwrap()
    } else {
        now + chrono::Duration::seconds(60)
    }
}

/// Run history sessions forever, sleeping between wakes.
///
/// This is the process's only top-level control loop: device discovery,
/// session and upload failures are all contained here and the loop always
/// proceeds to the next scheduled wake.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let sink = UploadSink::new(&config.ingest_url, &config.ingest_token)?;
    let mut client: Option<ScaleClient> = None;

    loop {
        if client.is_none() {
            match ScaleClient::new(&config).await {
                Ok(c) => client = Some(c),
                Err(err) => log::warn!("scale not found: {err}"),
            }
        }

        if let Some(client) = client.as_mut() {
            match client.run_session(&config.profile, &sink).await {
                Ok(uploaded) => log::info!("session complete, {uploaded} records uploaded"),
                Err(err) => log::warn!("session failed: {err}"),
            }
        }

        let now = Local::now().naive_local();
        let wake = next_wake(now);
        let sleep_secs = (wake - now).num_seconds().max(0) as u64;
        log::info!("next wakeup at {wake}, sleeping {sleep_secs}s");
        tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
    }
}

#[cfg(test)]
fn at(hour: u32, minute: u32) -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2024, 5, 14)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

#[test]
fn test_next_wake_before_morning_window() {
    assert_eq!(next_wake(at(7, 0)), at(8, 0));
    assert_eq!(next_wake(at(0, 30)), at(8, 0));
}

#[test]
fn test_next_wake_between_windows() {
    assert_eq!(next_wake(at(10, 0)), at(21, 0));
    assert_eq!(next_wake(at(15, 45)), at(21, 0));
    assert_eq!(next_wake(at(20, 59)), at(21, 0));
}

#[test]
fn test_next_wake_polls_inside_windows() {
    assert_eq!(next_wake(at(9, 0)), at(9, 1));
    assert_eq!(next_wake(at(8, 0)), at(8, 1));
    assert_eq!(next_wake(at(22, 0)), at(22, 1));
    assert_eq!(next_wake(at(21, 30)), at(21, 31));
}
