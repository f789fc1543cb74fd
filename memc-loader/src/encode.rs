use prost::Message;

use crate::error::EncodeError;
use crate::parse::DeviceInstallRecord;

/// Wire payload stored under each device key.
///
/// ```proto
/// message UserApps {
///     repeated uint32 apps = 1;
///     optional double lat = 2;
///     optional double lon = 3;
/// }
/// ```
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl From<&DeviceInstallRecord> for UserApps {
    fn from(record: &DeviceInstallRecord) -> Self {
        Self {
            apps: record.apps.clone(),
            lat: Some(record.lat),
            lon: Some(record.lon),
        }
    }
}

/// A keyed, encoded record waiting on a target queue.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteJob {
    pub key: String,
    pub payload: Vec<u8>,
}

pub fn encode_record(record: &DeviceInstallRecord) -> Result<WriteJob, EncodeError> {
    let message = UserApps::from(record);
    let mut payload = Vec::with_capacity(message.encoded_len());
    message.encode(&mut payload)?;
    Ok(WriteJob {
        key: record.key(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeviceInstallRecord {
        DeviceInstallRecord {
            device_type: "gaid".to_string(),
            device_id: "7rfw452y52g2gq4g".to_string(),
            lat: 55.55,
            lon: 42.42,
            apps: vec![1423, 43, 567, 3, 7, 23],
        }
    }

    #[test]
    fn test_encode_keys_by_type_and_id() {
        let job = encode_record(&record()).unwrap();
        assert_eq!(job.key, "gaid:7rfw452y52g2gq4g");

        let decoded = UserApps::decode(job.payload.as_slice()).unwrap();
        assert_eq!(decoded.apps, vec![1423, 43, 567, 3, 7, 23]);
        assert_eq!(decoded.lat, Some(55.55));
        assert_eq!(decoded.lon, Some(42.42));
    }

    #[test]
    fn test_payload_does_not_carry_identifiers() {
        let job = encode_record(&record()).unwrap();
        let haystack = String::from_utf8_lossy(&job.payload);
        assert!(!haystack.contains("7rfw452y52g2gq4g"));
        assert!(!haystack.contains("gaid"));
    }

    #[test]
    fn test_encode_without_apps() {
        let mut record = record();
        record.apps.clear();
        record.lat = 0.0;
        let job = encode_record(&record).unwrap();

        let decoded = UserApps::decode(job.payload.as_slice()).unwrap();
        assert!(decoded.apps.is_empty());
        // proto2 optionals are written even when zero
        assert_eq!(decoded.lat, Some(0.0));
    }
}
