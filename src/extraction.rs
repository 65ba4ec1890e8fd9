//! Orchestration of a complete extraction: container → datasets → thickness → window → inversion.

use crate::config::ExtractionConfig;
use crate::data_container::{ExtractionResult, Measurement, Waveform};
use crate::enrichment::CompoundLookup;
use crate::error::{ContainerError, ExtractionError};
use crate::inversion::invert_with;
use crate::io::Container;
use crate::record::SpectrumRecord;
use crate::table::{parse_combined, parse_table, IntensityKind};
use crate::{resolver, thickness, windowing};
use rayon::prelude::*;

/// Extracts the optical constants with the default configuration.
pub fn extract(
    container_bytes: &[u8],
    thickness_override: Option<&str>,
) -> Result<ExtractionResult, ExtractionError> {
    extract_with_config(
        container_bytes,
        thickness_override,
        &ExtractionConfig::default(),
    )
}

/// Extracts the optical constants of the configured (or first) measurement of a container.
pub fn extract_with_config(
    container_bytes: &[u8],
    thickness_override: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let container = Container::open(container_bytes)?;
    let (name, measurement) = match &config.measurement {
        Some(name) => (name.as_str(), container.get_measurement(name)?),
        None => container.first_measurement()?,
    };
    log::info!("extracting measurement '{name}'");
    extract_measurement(name, measurement, thickness_override, config)
}

/// Runs the pipeline on an already opened measurement.
pub fn extract_measurement(
    name: &str,
    measurement: &Measurement,
    thickness_override: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let (sample_name, reference_name) = resolver::resolve(measurement.datasets.keys())?;
    let raw_sample = dataset_waveform(name, measurement, &sample_name)?;
    let raw_reference = dataset_waveform(name, measurement, &reference_name)?;

    let thickness_mm = thickness::resolve(&measurement.meta_data, thickness_override)?;

    let [sample, reference] = windowing::apply_common_window(
        [raw_sample.clone(), raw_reference.clone()],
        config.window_half_width,
        config.window_kind,
    )?;

    let output = invert_with(
        &sample,
        &reference,
        thickness_mm,
        &config.inversion_settings(),
    )?;
    log::info!(
        "extracted {} frequency bins for '{name}' (d = {thickness_mm} mm)",
        output.len()
    );

    Ok(ExtractionResult {
        measurement: name.to_string(),
        sample_dataset: sample_name,
        reference_dataset: reference_name,
        frequency: output.frequency,
        refractive_index: output.refractive_index,
        absorption_coefficient: output.absorption_coefficient,
        sample,
        reference,
        raw_sample,
        raw_reference,
        thickness_mm,
        metadata: measurement.meta_data.sanitized(),
        compound: None,
    })
}

fn dataset_waveform(
    measurement_name: &str,
    measurement: &Measurement,
    dataset: &str,
) -> Result<Waveform, ContainerError> {
    measurement
        .waveform(dataset)
        .ok_or_else(|| ContainerError::Malformed {
            entry: format!("{measurement_name}/{dataset}"),
            reason: "dataset is not a two-column (time, amplitude) array".to_string(),
        })
}

/// One container of a batch run.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionJob<'a> {
    pub container_bytes: &'a [u8],
    pub thickness_override: Option<&'a str>,
}

/// Extracts independent containers in parallel. The results keep the order of `jobs`.
pub fn extract_batch(
    jobs: &[ExtractionJob<'_>],
    config: &ExtractionConfig,
) -> Vec<Result<ExtractionResult, ExtractionError>> {
    log::info!("extracting {} containers", jobs.len());
    jobs.par_iter()
        .map(|job| extract_with_config(job.container_bytes, job.thickness_override, config))
        .collect()
}

/// Attaches the compound matching `material`. Lookup failures leave the result unchanged.
pub fn enrich(
    mut result: ExtractionResult,
    material: &str,
    lookup: &dyn CompoundLookup,
) -> ExtractionResult {
    match lookup.lookup(material) {
        Ok(Some(compound)) => {
            log::debug!("found compound {compound:?} for '{material}'");
            result.compound = Some(compound);
        }
        Ok(None) => log::info!("no compound found for '{material}'"),
        Err(err) => log::warn!("compound lookup for '{material}' failed: {err}"),
    }
    result
}

/// An upload as received from the storage layer.
#[derive(Debug, Clone, Copy)]
pub enum Upload<'a> {
    /// A measurement container, evaluated with the full pipeline.
    Container {
        bytes: &'a [u8],
        thickness_override: Option<&'a str>,
    },
    /// A two-column CSV table with optional metadata JSON text.
    Table {
        bytes: &'a [u8],
        kind: IntensityKind,
        metadata_json: Option<&'a str>,
    },
    /// Metadata JSON on the first line, two-column rows below.
    Combined { bytes: &'a [u8], kind: IntensityKind },
}

/// Turns an upload into a record ready for storage.
pub fn ingest(
    upload: Upload<'_>,
    material: &str,
    config: &ExtractionConfig,
) -> Result<SpectrumRecord, ExtractionError> {
    match upload {
        Upload::Container {
            bytes,
            thickness_override,
        } => {
            let result = extract_with_config(bytes, thickness_override, config)?;
            Ok(SpectrumRecord::from_result(&result, material))
        }
        Upload::Table {
            bytes,
            kind,
            metadata_json,
        } => Ok(SpectrumRecord::from_table(
            parse_table(bytes, kind, metadata_json)?,
            material,
        )),
        Upload::Combined { bytes, kind } => Ok(SpectrumRecord::from_table(
            parse_combined(bytes, kind)?,
            material,
        )),
    }
}
