//! InfluxDB transmitter for telemeter measurements.
//!
//! [`InfluxTransmitter`] implements the [`Transmitter`] capability by encoding
//! each measurement in the InfluxDB line protocol and writing the batch to the
//! database's HTTP `/write` endpoint. The HTTP client is created lazily on the
//! first write, so constructing the transmitter never touches the network.
//!
//! Any HTTP or server-side failure surfaces as a generic [`TransmitError`];
//! when the transmitter is wrapped in a
//! [`BufferedTransmitter`](telemeter_metrics::BufferedTransmitter), failed
//! batches stay buffered and are retried on the next flush.
//!
//! # Example
//!
//! ```no_run
//! use telemeter_influx::{InfluxConfig, InfluxTransmitter};
//!
//! let transmitter = InfluxTransmitter::new(InfluxConfig {
//!     url: "http://influx.internal:8086".to_owned(),
//!     database: "telemetry".to_owned(),
//!     ..Default::default()
//! });
//! ```

#![warn(missing_docs)]

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use telemeter_metrics::{Measurement, TransmitError, Transmitter};

/// Configuration for the [`InfluxTransmitter`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Base URL of the InfluxDB instance.
    ///
    /// Defaults to `http://localhost:8086`.
    pub url: String,

    /// The database measurements are written to.
    ///
    /// Defaults to `metrics`.
    pub database: String,

    /// User name for basic authentication. Authentication is only sent when
    /// this is non-empty.
    pub username: String,

    /// Password for basic authentication.
    pub password: String,

    /// Timeout in milliseconds for a single write request.
    ///
    /// Bounds how long a flush can stall on an unresponsive server. Defaults
    /// to `5000`.
    pub timeout_ms: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_owned(),
            database: "metrics".to_owned(),
            username: String::new(),
            password: String::new(),
            timeout_ms: 5000,
        }
    }
}

/// A [`Transmitter`] writing measurements to InfluxDB.
#[derive(Debug)]
pub struct InfluxTransmitter {
    config: InfluxConfig,
    client: OnceLock<Client>,
}

impl InfluxTransmitter {
    /// Creates a transmitter for the given InfluxDB instance.
    ///
    /// No connection is made until the first batch is published.
    pub fn new(config: InfluxConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, TransmitError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .build()
            .map_err(TransmitError::new)?;

        Ok(self.client.get_or_init(|| client))
    }

    fn write_url(&self) -> Result<Url, TransmitError> {
        let mut url = Url::parse(&self.config.url).map_err(TransmitError::new)?;

        url.path_segments_mut()
            .map_err(|()| TransmitError::new("influx url cannot be a base"))?
            .pop_if_empty()
            .push("write");

        url.query_pairs_mut()
            .append_pair("db", &self.config.database)
            .append_pair("precision", "ns");

        Ok(url)
    }
}

impl Transmitter for InfluxTransmitter {
    fn publish(&self, measurements: &[Measurement]) -> Result<(), TransmitError> {
        if measurements.is_empty() {
            return Ok(());
        }

        let body = measurements
            .iter()
            .map(format_line)
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = self.client()?.post(self.write_url()?).body(body);
        if !self.config.username.is_empty() {
            request = request.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let response = request.send().map_err(TransmitError::new)?;
        response.error_for_status().map_err(TransmitError::new)?;

        telemeter_log::trace!("wrote {} measurements to influxdb", measurements.len());
        Ok(())
    }
}

/// Encodes a measurement in the InfluxDB line protocol with a nanosecond
/// timestamp. Tags render in key order, which the `TagMap` guarantees.
fn format_line(measurement: &Measurement) -> String {
    let mut line = escape_measurement(measurement.name());

    for (key, value) in measurement.tags() {
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(value));
    }

    line.push_str(" value=");
    line.push_str(&measurement.value().to_string());

    line.push(' ');
    let nanos = measurement.timestamp().timestamp_nanos_opt().unwrap_or_default();
    line.push_str(&nanos.to_string());

    line
}

/// Escapes a measurement name: commas and spaces.
fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escapes a tag key or value: commas, equal signs and spaces.
fn escape_tag(tag: &str) -> String {
    tag.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use similar_asserts::assert_eq;
    use telemeter_metrics::{FiniteF64, TagMap};

    use super::*;

    fn frozen_measurement() -> Measurement {
        Measurement::at(
            "cpu.load",
            FiniteF64::new(0.5).unwrap(),
            TagMap::from([
                ("host".to_owned(), "web-1".to_owned()),
                ("region".to_owned(), "eu".to_owned()),
            ]),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_line_protocol() {
        assert_eq!(
            format_line(&frozen_measurement()),
            "cpu.load,host=web-1,region=eu value=0.5 1704067200000000000"
        );
    }

    #[test]
    fn test_line_protocol_escaping() {
        let measurement = Measurement::at(
            "disk usage,total",
            42.into(),
            TagMap::from([("mount point".to_owned(), "a=b".to_owned())]),
            Utc.timestamp_opt(1, 0).unwrap(),
        );

        assert_eq!(
            format_line(&measurement),
            "disk\\ usage\\,total,mount\\ point=a\\=b value=42 1000000000"
        );
    }

    #[test]
    fn test_line_protocol_without_tags() {
        let measurement = Measurement::at(
            "uptime",
            1.into(),
            TagMap::new(),
            Utc.timestamp_opt(1, 0).unwrap(),
        );

        assert_eq!(format_line(&measurement), "uptime value=1 1000000000");
    }

    #[test]
    fn test_write_url() {
        let transmitter = InfluxTransmitter::new(InfluxConfig {
            database: "app metrics".to_owned(),
            ..Default::default()
        });

        assert_eq!(
            transmitter.write_url().unwrap().as_str(),
            "http://localhost:8086/write?db=app+metrics&precision=ns"
        );
    }

    #[test]
    fn test_default_config() {
        insta::assert_json_snapshot!(InfluxConfig::default(), @r###"
        {
          "url": "http://localhost:8086",
          "database": "metrics",
          "username": "",
          "password": "",
          "timeout_ms": 5000
        }
        "###);
    }
}
