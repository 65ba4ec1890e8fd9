//! Ingestion of spectra that are uploaded as plain text instead of a measurement container.
//!
//! Two layouts are accepted: a two-column CSV table (frequency, intensity) with an optional metadata JSON
//! object supplied separately, and a "combined" text file whose first line is the metadata JSON object and
//! whose remaining lines are the two-column rows.

use crate::data_container::MetadataRecord;
use crate::error::FormatError;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// What the intensity column of an uploaded table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityKind {
    RefractiveIndex,
    AbsorptionCoefficient,
}

impl Display for IntensityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IntensityKind::RefractiveIndex => write!(f, "refractive index"),
            IntensityKind::AbsorptionCoefficient => write!(f, "absorption coefficient"),
        }
    }
}

/// A parsed text upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumTable {
    pub frequency: Vec<f64>,
    pub intensity: Vec<f64>,
    pub kind: IntensityKind,
    pub metadata: MetadataRecord,
}

fn decode(bytes: &[u8]) -> Result<&str, FormatError> {
    std::str::from_utf8(bytes).map_err(|_| FormatError::Encoding)
}

/// Parses the two-column rows of `text`. Row numbers in errors are 1-based lines of `text`.
fn parse_rows(text: &str) -> Result<(Vec<f64>, Vec<f64>), FormatError> {
    // blank lines are skipped by the reader itself
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut frequency = Vec::new();
    let mut intensity = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| FormatError::Csv(e.to_string()))?;
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(i + 1);
        if record.len() != 2 {
            return Err(FormatError::WrongColumnCount {
                row,
                found: record.len(),
            });
        }
        match (record[0].parse::<f64>(), record[1].parse::<f64>()) {
            (Ok(f), Ok(value)) => {
                frequency.push(f);
                intensity.push(value);
            }
            _ => {
                return Err(FormatError::NonNumericField {
                    row,
                    values: record.iter().map(|v| v.to_string()).collect(),
                })
            }
        }
    }

    if frequency.is_empty() {
        return Err(FormatError::Empty);
    }
    Ok((frequency, intensity))
}

/// Parses metadata given as JSON text. Blank text is an empty record.
pub fn parse_metadata_json(text: &str) -> Result<MetadataRecord, FormatError> {
    if text.trim().is_empty() {
        return Ok(MetadataRecord::default());
    }
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FormatError::InvalidMetadata(e.to_string()))?;
    MetadataRecord::from_flat_json(&value).map_err(FormatError::InvalidMetadata)
}

/// Parses a two-column CSV upload with optional metadata JSON text.
pub fn parse_table(
    bytes: &[u8],
    kind: IntensityKind,
    metadata_json: Option<&str>,
) -> Result<SpectrumTable, FormatError> {
    let text = decode(bytes)?;
    let (frequency, intensity) = parse_rows(text)?;
    let metadata = match metadata_json {
        Some(json) => parse_metadata_json(json)?,
        None => MetadataRecord::default(),
    };
    log::debug!("parsed {} {kind} rows from table upload", frequency.len());
    Ok(SpectrumTable {
        frequency,
        intensity,
        kind,
        metadata,
    })
}

/// Parses the combined layout: metadata JSON object on the first line, rows below.
pub fn parse_combined(bytes: &[u8], kind: IntensityKind) -> Result<SpectrumTable, FormatError> {
    let text = decode(bytes)?;
    let (header, rows) = text.split_once('\n').unwrap_or((text, ""));
    if header.trim().is_empty() {
        return Err(FormatError::Empty);
    }
    let metadata = parse_metadata_json(header)?;
    let (frequency, intensity) = parse_rows(rows)?;
    log::debug!("parsed {} {kind} rows from combined upload", frequency.len());
    Ok(SpectrumTable {
        frequency,
        intensity,
        kind,
        metadata,
    })
}
