use tracing::debug;

use crate::error::ParseError;
use crate::metrics_consts::INVALID_NUMERIC_FIELDS;

const FIELD_COUNT: usize = 5;

/// One device's installed apps and location, as read from a single log line.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInstallRecord {
    pub device_type: String,
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<u32>,
}

impl DeviceInstallRecord {
    /// The store key this record is written under.
    pub fn key(&self) -> String {
        format!("{}:{}", self.device_type, self.device_id)
    }
}

/// Parse a `type\tid\tlat\tlon\tapp,app,...` line.
///
/// Only the field count and the two identifiers can reject a line. Bad coordinates fall back to
/// `0.0` and app ids that aren't unsigned 32 bit integers are skipped.
pub fn parse_line(line: &str) -> Result<DeviceInstallRecord, ParseError> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    let [device_type, device_id, lat, lon, raw_apps] = fields[..] else {
        return Err(ParseError::WrongFieldCount(fields.len()));
    };
    if device_type.is_empty() || device_id.is_empty() {
        return Err(ParseError::MissingIdentifier);
    }

    let apps = raw_apps
        .split(',')
        .filter_map(|token| match token.parse::<u32>() {
            Ok(app) => Some(app),
            Err(_) => {
                debug!("skipping non numeric app id {:?}", token);
                None
            }
        })
        .collect();

    Ok(DeviceInstallRecord {
        device_type: device_type.to_string(),
        device_id: device_id.to_string(),
        lat: parse_coordinate("lat", lat),
        lon: parse_coordinate("lon", lon),
        apps,
    })
}

fn parse_coordinate(name: &'static str, raw: &str) -> f64 {
    raw.parse().unwrap_or_else(|_| {
        debug!("invalid {} coordinate {:?}, using 0.0", name, raw);
        metrics::counter!(INVALID_NUMERIC_FIELDS, "field" => name).increment(1);
        0.0
    })
}
