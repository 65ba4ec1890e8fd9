use approx::assert_abs_diff_eq;
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use thz_extract::enrichment::{CompoundInfo, CompoundLookup, CompoundTable, LookupError};
use thz_extract::error::{
    ContainerError, ExtractionError, InversionError, ResolverError, ThicknessError, WindowError,
};
use thz_extract::extraction::ExtractionJob;
use thz_extract::inversion::SPEED_OF_LIGHT_MM_PER_PS;
use thz_extract::io;
use thz_extract::math_tools::WindowKind;
use thz_extract::table::IntensityKind;
use thz_extract::thickness::THICKNESS_KEY;
use thz_extract::windowing::apply_common_window;
use thz_extract::{
    enrich, extract, extract_batch, extract_with_config, ingest, ExtractionConfig, Measurement,
    MetaValue, MetadataRecord, SpectrumRecord, Upload,
};

const SAMPLES: usize = 256;
const DT: f64 = 0.05;
const SIGMA: f64 = 0.15;

fn gaussian_derivative(t: f64, t0: f64) -> f64 {
    let x = t - t0;
    -x / (SIGMA * SIGMA) * (-(x * x) / (2.0 * SIGMA * SIGMA)).exp()
}

fn dataset(t0: f64, scale: f64) -> Array2<f64> {
    let time = Array1::from_iter((0..SAMPLES).map(|i| i as f64 * DT));
    let amplitude = time.mapv(|t| scale * gaussian_derivative(t, t0));
    ndarray::stack(ndarray::Axis(1), &[time.view(), amplitude.view()]).unwrap()
}

/// A 1 mm slab with n = 1.5 seen as a pure delay and attenuation of the reference pulse.
fn slab_measurement(thickness: Option<Option<MetaValue>>) -> Measurement {
    let delay = 0.5 / SPEED_OF_LIGHT_MM_PER_PS;
    let mut datasets = IndexMap::new();
    datasets.insert("Sample".to_string(), dataset(3.0 + delay, 0.5));
    datasets.insert("Reference".to_string(), dataset(3.0, 1.0));
    let mut meta_data = MetadataRecord::default();
    meta_data.insert("user", Some(MetaValue::Text("Alice".to_string())));
    meta_data.insert("T [K]", Some(MetaValue::Number(295.0)));
    if let Some(value) = thickness {
        meta_data.insert(THICKNESS_KEY, value);
    }
    Measurement {
        datasets,
        meta_data,
    }
}

fn container(measurement: &Measurement) -> Vec<u8> {
    io::write("Measurement 1", measurement).unwrap()
}

fn slab_container() -> Vec<u8> {
    container(&slab_measurement(Some(Some(MetaValue::Number(1.0)))))
}

#[test]
fn test_valid_container_gives_equal_length_spectra() {
    let result = extract(&slab_container(), None).unwrap();
    assert!(!result.frequency.is_empty());
    assert_eq!(result.frequency.len(), result.refractive_index.len());
    assert_eq!(result.frequency.len(), result.absorption_coefficient.len());
    assert_eq!(result.measurement, "Measurement 1");
    assert_eq!(result.sample_dataset, "Sample");
    assert_eq!(result.reference_dataset, "Reference");
    assert_eq!(result.thickness_mm, 1.0);
    assert_eq!(
        result.metadata["user"],
        Some(MetaValue::Text("Alice".to_string()))
    );
    assert_eq!(result.metadata["email"], None);
    assert_eq!(result.raw_sample.len(), SAMPLES);
    assert!(result.sample.window.is_some());
}

#[test]
fn test_unreadable_thz_file_is_a_container_error() {
    let mut bytes = b"\x89HDF\r\n\x1a\n".to_vec();
    bytes.resize(512, 0);
    assert!(matches!(
        extract(&bytes, Some("1.0")),
        Err(ExtractionError::Container(ContainerError::Thz(_)))
    ));
}

#[test]
fn test_synthetic_slab_recovers_the_index() {
    let result = extract(&slab_container(), None).unwrap();
    assert!(result.frequency[0] >= 0.2);
    assert!(*result.frequency.last().unwrap() <= 3.0);
    let mean = result.refractive_index.iter().sum::<f64>() / result.refractive_index.len() as f64;
    assert_abs_diff_eq!(mean, 1.5, epsilon = 0.02);
    for n in &result.refractive_index {
        assert_abs_diff_eq!(*n, 1.5, epsilon = 0.05);
    }
    assert!(result.absorption_coefficient.iter().all(|a| a.is_finite()));
}

#[test]
fn test_two_sample_datasets_are_ambiguous() {
    let mut measurement = slab_measurement(Some(Some(MetaValue::Number(1.0))));
    measurement
        .datasets
        .insert("sample 2".to_string(), dataset(4.0, 0.5));
    let err = extract(&container(&measurement), None).unwrap_err();
    match err {
        ExtractionError::Resolver(ResolverError::AmbiguousSample(candidates)) => {
            assert_eq!(candidates, vec!["Sample".to_string(), "sample 2".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_missing_thickness_requires_an_override() {
    let bytes = container(&slab_measurement(None));
    let err = extract(&bytes, None).unwrap_err();
    assert!(err.needs_thickness_override());
    assert!(matches!(
        err,
        ExtractionError::Thickness(ThicknessError::Required(_))
    ));

    let result = extract(&bytes, Some("1.0")).unwrap();
    assert_eq!(result.thickness_mm, 1.0);
    assert!(!result.refractive_index.is_empty());

    let empty = container(&slab_measurement(Some(None)));
    assert!(extract(&empty, None).unwrap_err().needs_thickness_override());
}

#[test]
fn test_non_numeric_override_is_a_thickness_error() {
    let bytes = container(&slab_measurement(None));
    let err = extract(&bytes, Some("abc")).unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::Thickness(ThicknessError::InvalidOverride(ref raw)) if raw == "abc"
    ));
    assert!(!err.needs_thickness_override());
}

#[test]
fn test_non_positive_thickness_is_rejected() {
    let bytes = container(&slab_measurement(None));
    assert!(matches!(
        extract(&bytes, Some("0")),
        Err(ExtractionError::Thickness(ThicknessError::Invalid(_)))
    ));
    let negative = container(&slab_measurement(Some(Some(MetaValue::Number(-0.5)))));
    assert!(matches!(
        extract(&negative, None),
        Err(ExtractionError::Thickness(ThicknessError::Invalid(_)))
    ));
}

#[test]
fn test_inverted_band_is_rejected() {
    let config = ExtractionConfig {
        freq_min: 3.0,
        freq_max: 0.2,
        ..ExtractionConfig::default()
    };
    assert!(matches!(
        extract_with_config(&slab_container(), None, &config),
        Err(ExtractionError::Inversion(InversionError::InvalidBand { .. }))
    ));
}

#[test]
fn test_configured_measurement_must_exist() {
    let config = ExtractionConfig {
        measurement: Some("Measurement 7".to_string()),
        ..ExtractionConfig::default()
    };
    assert!(matches!(
        extract_with_config(&slab_container(), None, &config),
        Err(ExtractionError::Container(ContainerError::NotFound(_)))
    ));
}

#[test]
fn test_record_round_trip_recovers_waveforms_and_metadata() {
    let first = extract(&slab_container(), None).unwrap();
    let record = SpectrumRecord::from_result(&first, "PTFE");
    let record = SpectrumRecord::from_json(&record.to_json().unwrap()).unwrap();
    let bytes = record.to_container_bytes("PTFE").unwrap();

    let second = extract(&bytes, None).unwrap();
    assert_eq!(second.raw_sample, first.raw_sample);
    assert_eq!(second.raw_reference, first.raw_reference);
    // dotThz metadata is text
    assert_eq!(
        second.metadata["T [K]"],
        Some(MetaValue::Text("295".to_string()))
    );
    assert_eq!(
        second.metadata[THICKNESS_KEY],
        Some(MetaValue::Text("1".to_string()))
    );
    assert_eq!(
        second.metadata["user"],
        Some(MetaValue::Text("Alice".to_string()))
    );
    assert_eq!(second.frequency, first.frequency);
    for (a, b) in second
        .refractive_index
        .iter()
        .zip(first.refractive_index.iter())
    {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_windowing_the_result_again_changes_nothing() {
    let result = extract(&slab_container(), None).unwrap();
    let config = ExtractionConfig::default();
    let pair = [result.sample.clone(), result.reference.clone()];
    let again = apply_common_window(pair, config.window_half_width, config.window_kind).unwrap();
    assert_eq!(again[0], result.sample);
    assert_eq!(again[1], result.reference);

    let other = apply_common_window(
        [result.sample.clone(), result.reference.clone()],
        64,
        WindowKind::Hanning,
    )
    .unwrap();
    assert_ne!(other[0], result.sample);
}

#[test]
fn test_disjoint_time_spans_fail_in_windowing() {
    let mut measurement = slab_measurement(Some(Some(MetaValue::Number(1.0))));
    let mut late_sample = dataset(4.0, 0.5);
    late_sample.column_mut(0).mapv_inplace(|t| t + 20.0);
    measurement
        .datasets
        .insert("Sample".to_string(), late_sample);
    let err = extract(&container(&measurement), None).unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::Window(WindowError::CentreOutsideWaveform { start, .. }) if start == 20.0
    ));
}

#[test]
fn test_batch_keeps_job_order() {
    let good = slab_container();
    let needs_thickness = container(&slab_measurement(None));
    let jobs = [
        ExtractionJob {
            container_bytes: &good,
            thickness_override: None,
        },
        ExtractionJob {
            container_bytes: &needs_thickness,
            thickness_override: None,
        },
        ExtractionJob {
            container_bytes: &needs_thickness,
            thickness_override: Some("1.0"),
        },
    ];
    let results = extract_batch(&jobs, &ExtractionConfig::default());
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1]
        .as_ref()
        .is_err_and(|e| e.needs_thickness_override()));
    assert!(results[2].is_ok());
}

struct BrokenLookup;

impl CompoundLookup for BrokenLookup {
    fn lookup(&self, _name: &str) -> Result<Option<CompoundInfo>, LookupError> {
        Err(LookupError::Unavailable("offline".to_string()))
    }
}

#[test]
fn test_enrichment_is_best_effort() {
    let result = extract(&slab_container(), None).unwrap();
    let unchanged = enrich(result.clone(), "PTFE", &BrokenLookup);
    assert!(unchanged.compound.is_none());
    assert_eq!(unchanged.refractive_index, result.refractive_index);

    let table = CompoundTable::new([CompoundInfo {
        name: "PTFE".to_string(),
        compound_id: Some(9883),
        image: Some(vec![1, 2, 3]),
        image_url: None,
    }]);
    let enriched = enrich(result, "ptfe", &table);
    let compound = enriched.compound.unwrap();
    assert_eq!(compound.compound_id, Some(9883));
    assert_eq!(compound.image, Some(vec![1, 2, 3]));
}

#[test]
fn test_ingest_dispatches_by_upload_kind() {
    let config = ExtractionConfig::default();
    let container_bytes = slab_container();
    let record = ingest(
        Upload::Container {
            bytes: &container_bytes,
            thickness_override: None,
        },
        "PTFE",
        &config,
    )
    .unwrap();
    assert!(record.refractive_index_available && record.absorption_coefficient_available);
    assert_eq!(record.raw_sample_time.len(), SAMPLES);

    let record = ingest(
        Upload::Table {
            bytes: b"0.5,1.43\n1.0,1.44\n",
            kind: IntensityKind::RefractiveIndex,
            metadata_json: Some(r#"{"instrument": "TeraK15"}"#),
        },
        "PTFE",
        &config,
    )
    .unwrap();
    assert!(record.refractive_index_available);
    assert!(!record.absorption_coefficient_available);
    assert_eq!(
        record.metadata["instrument"],
        Some(MetaValue::Text("TeraK15".to_string()))
    );

    let err = ingest(
        Upload::Combined {
            bytes: b"{}\n0.5;1.43\n",
            kind: IntensityKind::RefractiveIndex,
        },
        "PTFE",
        &config,
    )
    .unwrap_err();
    assert!(matches!(err, ExtractionError::Format(_)));
}
