use std::str::FromStr;

use anyhow::{anyhow, Context};
use bluest::Uuid;

/// The sex of the scale user, as used by the body composition formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            other => Err(anyhow!("unknown sex {other:?}, expected \"male\" or \"female\"")),
        }
    }
}

/// Static data about the scale user, needed to derive body fat from
/// weight and impedance. Read-only for the lifetime of the process.
#[derive(Debug, Clone, Copy)]
pub struct UserProfile {
    pub sex: Sex,
    /// Age in years
    pub age: u32,
    /// Height in cm
    pub height_cm: f64,
}

/// Process-wide configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The advertised BLE name of the scale
    pub device_name: String,
    /// The body composition GATT service the scale advertises
    pub service_uuid: Uuid,
    /// The vendor characteristic carrying the stored weight history
    pub history_characteristic_uuid: Uuid,
    pub profile: UserProfile,
    /// URL of the ingestion endpoint records are POSTed to
    pub ingest_url: String,
    /// Shared secret expected by the ingestion endpoint
    pub ingest_token: String,
}

impl Config {
    const DEFAULT_DEVICE_NAME: &'static str = "MIBCS";
    const DEFAULT_SERVICE_ID: &'static str = "0000181b-0000-1000-8000-00805f9b34fb";
    const DEFAULT_HISTORY_CHARACTERISTIC_ID: &'static str =
        "00002a2f-0000-3512-2118-0009af100700";
    const DEFAULT_INGEST_URL: &'static str = "http://127.0.0.1:10086/xiaomi_scale";

    /// Build a `Config` from `SCALE_*` environment variables, falling back
    /// to defaults matching the reference deployment.
    pub fn from_env() -> anyhow::Result<Self> {
        let device_name = env_or("SCALE_DEVICE_NAME", Self::DEFAULT_DEVICE_NAME);

        let service_uuid = env_or("SCALE_SERVICE_UUID", Self::DEFAULT_SERVICE_ID);
        let service_uuid =
            Uuid::parse_str(&service_uuid).context("SCALE_SERVICE_UUID is not a valid UUID")?;

        let history_characteristic_uuid = env_or(
            "SCALE_HISTORY_CHARACTERISTIC",
            Self::DEFAULT_HISTORY_CHARACTERISTIC_ID,
        );
        let history_characteristic_uuid = Uuid::parse_str(&history_characteristic_uuid)
            .context("SCALE_HISTORY_CHARACTERISTIC is not a valid UUID")?;

        let sex: Sex = env_or("SCALE_USER_SEX", "male").parse()?;
        let age: u32 = env_or("SCALE_USER_AGE", "20")
            .parse()
            .context("SCALE_USER_AGE must be a whole number of years")?;
        let height_cm: f64 = env_or("SCALE_USER_HEIGHT_CM", "180")
            .parse()
            .context("SCALE_USER_HEIGHT_CM must be a number")?;

        let ingest_url = env_or("SCALE_INGEST_URL", Self::DEFAULT_INGEST_URL);
        let ingest_token = env_or("SCALE_INGEST_TOKEN", "testtest");

        Ok(Self {
            device_name,
            service_uuid,
            history_characteristic_uuid,
            profile: UserProfile { sex, age, height_cm },
            ingest_url,
            ingest_token,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[test]
fn test_sex_from_str() {
    assert_eq!("male".parse::<Sex>().unwrap(), Sex::Male);
    assert_eq!("Female".parse::<Sex>().unwrap(), Sex::Female);
    assert!("other".parse::<Sex>().is_err());
}
