//! Resolves the physical sample thickness used by the inversion.
//!
//! The metadata value under [`THICKNESS_KEY`] wins if it is a number. Otherwise the caller-supplied
//! override is used. Without either, [`ThicknessError::Required`] reports why the metadata could not
//! be used, so the caller can decide between asking for an override and reporting corrupt data.

use crate::data_container::MetadataRecord;
use crate::error::{ThicknessCause, ThicknessError};

/// Custom metadata key holding the sample thickness in millimeters.
pub const THICKNESS_KEY: &str = "thickness [mm]";

fn validate(thickness: f64) -> Result<f64, ThicknessError> {
    if thickness.is_finite() && thickness > 0.0 {
        Ok(thickness)
    } else {
        Err(ThicknessError::Invalid(thickness))
    }
}

fn from_metadata(metadata: &MetadataRecord) -> Result<f64, ThicknessCause> {
    match metadata.custom(THICKNESS_KEY) {
        None => Err(ThicknessCause::KeyAbsent),
        Some(None) => Err(ThicknessCause::KeyEmpty),
        Some(Some(value)) => value
            .as_f64()
            .ok_or_else(|| ThicknessCause::Unparsable(value.to_string())),
    }
}

/// Resolves the thickness in mm from the metadata or from an override given as text.
pub fn resolve(
    metadata: &MetadataRecord,
    override_value: Option<&str>,
) -> Result<f64, ThicknessError> {
    let cause = match from_metadata(metadata) {
        Ok(thickness) => {
            log::debug!("using sample thickness {thickness} mm from metadata");
            return validate(thickness);
        }
        Err(cause) => cause,
    };
    match override_value {
        Some(raw) => {
            let thickness = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ThicknessError::InvalidOverride(raw.to_string()))?;
            log::info!("{cause}, using thickness override {thickness} mm");
            validate(thickness)
        }
        None => Err(ThicknessError::Required(cause)),
    }
}

/// Same as [`resolve`] for an override that is already a number.
pub fn resolve_with_value(
    metadata: &MetadataRecord,
    override_mm: Option<f64>,
) -> Result<f64, ThicknessError> {
    match from_metadata(metadata) {
        Ok(thickness) => validate(thickness),
        Err(cause) => match override_mm {
            Some(thickness) => validate(thickness),
            None => Err(ThicknessError::Required(cause)),
        },
    }
}
