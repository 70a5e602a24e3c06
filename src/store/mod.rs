//! Records exchanged with the external time-series store
//!
//! ```text
//! GET  <base>/outputs/latest   -> OutputRecord | null
//! GET  <base>/outputs/         -> [OutputRecord]
//! POST <base>/imu/             <- ImuRecord
//! ```

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::telemetry::TelemetrySample;

#[cfg(test)]
pub(crate) mod memory;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One commanded-output row. Missing channels stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "OutputRow")]
pub struct OutputRecord {
    pub step_index: u64,
    #[serde(rename = "M1")]
    pub m1: Option<f64>,
    #[serde(rename = "M2")]
    pub m2: Option<f64>,
    #[serde(rename = "M3")]
    pub m3: Option<f64>,
    #[serde(rename = "M4")]
    pub m4: Option<f64>,
    #[serde(rename = "M5")]
    pub m5: Option<f64>,
    #[serde(rename = "M6")]
    pub m6: Option<f64>,
    #[serde(rename = "M7")]
    pub m7: Option<f64>,
    #[serde(rename = "M8")]
    pub m8: Option<f64>,
    #[serde(rename = "S1")]
    pub s1: Option<f64>,
    #[serde(rename = "S2")]
    pub s2: Option<f64>,
    #[serde(rename = "S3")]
    pub s3: Option<f64>,
    pub armed: bool,
}

impl OutputRecord {
    pub fn motor_channels(&self) -> [Option<f64>; 8] {
        [self.m1, self.m2, self.m3, self.m4, self.m5, self.m6, self.m7, self.m8]
    }
}

/// Row as the store writes it. A row may carry its primary key next to
/// the step index, and the arm flag under more than one spelling.
#[derive(Deserialize)]
struct OutputRow {
    step_index: Option<u64>,
    id: Option<u64>,
    #[serde(rename = "ID")]
    id_upper: Option<u64>,
    #[serde(rename = "M1")]
    m1: Option<f64>,
    #[serde(rename = "M2")]
    m2: Option<f64>,
    #[serde(rename = "M3")]
    m3: Option<f64>,
    #[serde(rename = "M4")]
    m4: Option<f64>,
    #[serde(rename = "M5")]
    m5: Option<f64>,
    #[serde(rename = "M6")]
    m6: Option<f64>,
    #[serde(rename = "M7")]
    m7: Option<f64>,
    #[serde(rename = "M8")]
    m8: Option<f64>,
    #[serde(rename = "S1")]
    s1: Option<f64>,
    #[serde(rename = "S2")]
    s2: Option<f64>,
    #[serde(rename = "S3")]
    s3: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    armed: bool,
    #[serde(default, deserialize_with = "flag")]
    arm: bool,
    #[serde(rename = "Arm", default, deserialize_with = "flag")]
    arm_title: bool,
    #[serde(rename = "ARM", default, deserialize_with = "flag")]
    arm_upper: bool,
}

impl From<OutputRow> for OutputRecord {
    fn from(row: OutputRow) -> Self {
        OutputRecord {
            step_index: row.step_index.or(row.id).or(row.id_upper).unwrap_or(0),
            m1: row.m1,
            m2: row.m2,
            m3: row.m3,
            m4: row.m4,
            m5: row.m5,
            m6: row.m6,
            m7: row.m7,
            m8: row.m8,
            s1: row.s1,
            s2: row.s2,
            s3: row.s3,
            armed: row.armed || row.arm || row.arm_title || row.arm_upper,
        }
    }
}

//stores write the flag as bool, 0/1 or null
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(f64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Number(n)) => n != 0.0,
        None => false,
    })
}

/// Telemetry row in the store's `/imu/` schema
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuRecord {
    pub step_index: u64,
    #[serde(rename = "X")]
    pub x: f32,
    #[serde(rename = "Y")]
    pub y: f32,
    #[serde(rename = "Z")]
    pub z: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl ImuRecord {
    pub fn from_sample(step_index: u64, sample: &TelemetrySample) -> Self {
        ImuRecord {
            step_index,
            x: sample.vx,
            y: sample.vy,
            z: sample.vz,
            roll: sample.roll_deg,
            pitch: sample.pitch_deg,
            yaw: sample.yaw_deg,
        }
    }
}

/// Read/write contract the control loops need from the store
pub trait RecordStore {
    /// Most recent output row, `None` while the store is empty
    fn latest_output(&self) -> Result<Option<OutputRecord>>;

    /// Every output row, ordered by step index
    fn list_outputs(&self) -> Result<Vec<OutputRecord>>;

    fn publish_imu(&self, record: &ImuRecord) -> Result<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn latest_output(&self) -> Result<Option<OutputRecord>> {
        (**self).latest_output()
    }

    fn list_outputs(&self) -> Result<Vec<OutputRecord>> {
        (**self).list_outputs()
    }

    fn publish_imu(&self, record: &ImuRecord) -> Result<()> {
        (**self).publish_imu(record)
    }
}

/// Blocking HTTP client for the store's REST endpoints
pub struct HttpRecordStore {
    client: Client,
    base: String,
}

impl HttpRecordStore {
    /// `address` may omit the scheme, `http://` is assumed
    pub fn new(address: &str, port: u16) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base: base_url(address, port) })
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

fn base_url(address: &str, port: u16) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{address}:{port}")
    } else {
        format!("http://{address}:{port}")
    }
}

impl RecordStore for HttpRecordStore {
    fn latest_output(&self) -> Result<Option<OutputRecord>> {
        let url = format!("{}/outputs/latest", self.base);
        let record = self.client.get(&url).send()?.error_for_status()?.json()?;
        Ok(record)
    }

    fn list_outputs(&self) -> Result<Vec<OutputRecord>> {
        let url = format!("{}/outputs/", self.base);
        let records = self.client.get(&url).send()?.error_for_status()?.json()?;
        Ok(records)
    }

    fn publish_imu(&self, record: &ImuRecord) -> Result<()> {
        let url = format!("{}/imu/", self.base);
        self.client.post(&url).json(record).send()?.error_for_status()?;
        Ok(())
    }
}
