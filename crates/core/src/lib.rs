pub mod device;
pub mod error;
pub mod settings;

pub use device::{
    Device, DeviceRegistration, MachineType, PatchOp, PatchOperation, RegistrationProperties,
    Worker, WorkerState, HARDWARE_TYPE, SUPERVISOR_WORKER,
};
pub use error::{EdgeError, Result};
pub use settings::{LegacyKeyPolicy, Settings};

use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// JSON document read by the on-device supervisor at boot.
pub type ConfigDocument = serde_json::Map<String, serde_json::Value>;

/// Timestamps without an offset are taken as UTC, which is how the
/// inventory service renders `created_at`.
pub fn iso8601_to_epoch_millis(value: &str) -> Result<i64> {
    let trimmed = value.trim();
    let parsed = OffsetDateTime::parse(trimmed, &Rfc3339).or_else(|_| {
        PrimitiveDateTime::parse(trimmed, &Iso8601::DEFAULT).map(PrimitiveDateTime::assume_utc)
    });
    let moment = parsed
        .map_err(|err| EdgeError::InvalidInput(format!("invalid timestamp {trimmed:?}: {err}")))?;
    Ok((moment.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Checks a device name against RFC-1123 DNS subdomain rules.
pub fn validate_device_name(name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    let allowed =
        |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'.';
    let alnum = |b: Option<&u8>| matches!(b, Some(b) if b.is_ascii_lowercase() || b.is_ascii_digit());
    if bytes.len() < 2
        || bytes.len() > 255
        || !bytes.iter().all(allowed)
        || !alnum(bytes.first())
        || !alnum(bytes.last())
    {
        return Err(EdgeError::InvalidInput(format!(
            "device name {name:?} must be 2-255 lowercase alphanumerics, '-' or '.', \
             starting and ending with an alphanumeric"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_utc_timestamp_to_millis() {
        assert_eq!(
            iso8601_to_epoch_millis("2021-06-01T12:00:00Z").unwrap(),
            1_622_548_800_000
        );
    }

    #[test]
    fn converts_offset_and_fractional_timestamps() {
        assert_eq!(
            iso8601_to_epoch_millis("2021-06-01T14:00:00.250+02:00").unwrap(),
            1_622_548_800_250
        );
        assert_eq!(
            iso8601_to_epoch_millis("2021-06-01T12:00:00.000000").unwrap(),
            1_622_548_800_000
        );
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(matches!(
            iso8601_to_epoch_millis("yesterday"),
            Err(EdgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn accepts_dns_style_names() {
        assert!(validate_device_name("a-test-device-name").is_ok());
        assert!(validate_device_name("pi4.lab-2").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "a", "Upper", "-leading", "trailing.", "under_score", "sp ace"] {
            assert!(
                matches!(validate_device_name(name), Err(EdgeError::InvalidInput(_))),
                "{name} should be rejected"
            );
        }
    }
}
