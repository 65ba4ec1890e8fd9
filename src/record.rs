//! The storage view of a finished spectrum.
//!
//! A [`SpectrumRecord`] is what an external storage layer keeps per upload: the optical constants,
//! the raw time-domain traces, availability flags and the provenance assigned on upload. Records
//! can be exported back into a `.thz` container, in which case the provenance is embedded into
//! the custom metadata so that the exported file is self-describing.

use crate::data_container::{ExtractionResult, Measurement, MetaValue, MetadataRecord, Waveform};
use crate::enrichment::CompoundInfo;
use crate::error::{ContainerError, ExtractionError, FormatError, InversionError};
use crate::inversion::InversionOutput;
use crate::io;
use crate::table::{IntensityKind, SpectrumTable};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Custom metadata keys written on export.
pub const RECORD_ID_KEY: &str = "record id";
pub const UPLOAD_TIMESTAMP_KEY: &str = "upload timestamp";
pub const UPLOADED_BY_KEY: &str = "uploaded by";
pub const NOTES_KEY: &str = "notes";

/// Names of the output arrays every stored record must contain.
const OUTPUT_KEYS: [&str; 3] = ["frequency", "refractive_index", "absorption_coefficient"];

/// Identifiers assigned by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub record_id: u64,
    pub upload_timestamp: DateTime<Utc>,
    pub uploaded_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub material: String,
    #[serde(default)]
    pub metadata: IndexMap<String, Option<MetaValue>>,
    pub frequency: Vec<f64>,
    pub refractive_index: Vec<f64>,
    pub absorption_coefficient: Vec<f64>,
    #[serde(default)]
    pub raw_sample_time: Vec<f64>,
    #[serde(default)]
    pub raw_sample_amplitude: Vec<f64>,
    #[serde(default)]
    pub raw_reference_time: Vec<f64>,
    #[serde(default)]
    pub raw_reference_amplitude: Vec<f64>,
    #[serde(default)]
    pub refractive_index_available: bool,
    #[serde(default)]
    pub absorption_coefficient_available: bool,
    #[serde(default)]
    pub compound: Option<CompoundInfo>,
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl SpectrumRecord {
    /// Record of a container extraction; both optical constants are available.
    pub fn from_result(result: &ExtractionResult, material: &str) -> Self {
        SpectrumRecord {
            material: material.to_string(),
            metadata: result.metadata.clone(),
            frequency: result.frequency.clone(),
            refractive_index: result.refractive_index.clone(),
            absorption_coefficient: result.absorption_coefficient.clone(),
            raw_sample_time: result.raw_sample.time.to_vec(),
            raw_sample_amplitude: result.raw_sample.amplitude.to_vec(),
            raw_reference_time: result.raw_reference.time.to_vec(),
            raw_reference_amplitude: result.raw_reference.amplitude.to_vec(),
            refractive_index_available: true,
            absorption_coefficient_available: true,
            compound: result.compound.clone(),
            provenance: None,
        }
    }

    /// Record of a text upload; only the uploaded quantity is available, the other one stays empty.
    pub fn from_table(table: SpectrumTable, material: &str) -> Self {
        let (refractive_index, absorption_coefficient) = match table.kind {
            IntensityKind::RefractiveIndex => (table.intensity, Vec::new()),
            IntensityKind::AbsorptionCoefficient => (Vec::new(), table.intensity),
        };
        SpectrumRecord {
            material: material.to_string(),
            metadata: table.metadata.sanitized(),
            frequency: table.frequency,
            refractive_index_available: table.kind == IntensityKind::RefractiveIndex,
            absorption_coefficient_available: table.kind == IntensityKind::AbsorptionCoefficient,
            refractive_index,
            absorption_coefficient,
            raw_sample_time: Vec::new(),
            raw_sample_amplitude: Vec::new(),
            raw_reference_time: Vec::new(),
            raw_reference_amplitude: Vec::new(),
            compound: None,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Parses a stored record.
    ///
    /// A record without one of the output arrays fails with [`InversionError::MissingOutputKey`].
    pub fn from_json(text: &str) -> Result<Self, ExtractionError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| FormatError::Json(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| FormatError::Json("a record must be a JSON object".to_string()))?;
        if let Some(missing) = OUTPUT_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(InversionError::MissingOutputKey(missing.to_string()).into());
        }
        Ok(serde_json::from_value(value).map_err(|e| FormatError::Json(e.to_string()))?)
    }

    pub fn to_json(&self) -> Result<String, FormatError> {
        serde_json::to_string_pretty(self).map_err(|e| FormatError::Json(e.to_string()))
    }

    /// The stored optical constants.
    pub fn output(&self) -> InversionOutput {
        InversionOutput {
            frequency: self.frequency.clone(),
            refractive_index: self.refractive_index.clone(),
            absorption_coefficient: self.absorption_coefficient.clone(),
        }
    }

    /// Metadata of the exported measurement, with the provenance keys added to the custom fields.
    pub fn export_metadata(&self) -> MetadataRecord {
        let mut record = MetadataRecord::default();
        for (key, value) in &self.metadata {
            record.insert(key, value.clone());
        }
        if let Some(provenance) = &self.provenance {
            // always stored, even if the metadata carries equivalent entries
            record.md.insert(
                RECORD_ID_KEY.to_string(),
                Some(MetaValue::Text(provenance.record_id.to_string())),
            );
            record.md.insert(
                UPLOAD_TIMESTAMP_KEY.to_string(),
                Some(MetaValue::Text(provenance.upload_timestamp.to_rfc3339())),
            );
            record.md.insert(
                UPLOADED_BY_KEY.to_string(),
                provenance.uploaded_by.clone().map(MetaValue::Text),
            );
            record.md.insert(
                NOTES_KEY.to_string(),
                provenance.notes.clone().map(MetaValue::Text),
            );
        }
        record
    }

    /// Exports the record as a container with the raw traces as `Sample` and `Reference`.
    pub fn to_container_bytes(&self, measurement_name: &str) -> Result<Vec<u8>, ContainerError> {
        let mut measurement = Measurement {
            datasets: IndexMap::new(),
            meta_data: self.export_metadata(),
        };
        for (name, time, amplitude) in [
            ("Sample", &self.raw_sample_time, &self.raw_sample_amplitude),
            (
                "Reference",
                &self.raw_reference_time,
                &self.raw_reference_amplitude,
            ),
        ] {
            if time.is_empty() && amplitude.is_empty() {
                continue;
            }
            let waveform = Waveform::new(
                Array1::from_vec(time.clone()),
                Array1::from_vec(amplitude.clone()),
            )
            .ok_or_else(|| ContainerError::Malformed {
                entry: name.to_string(),
                reason: format!(
                    "{} time values but {} amplitude values",
                    time.len(),
                    amplitude.len()
                ),
            })?;
            measurement
                .datasets
                .insert(name.to_string(), waveform.to_columns());
        }
        io::write(measurement_name, &measurement)
    }
}
