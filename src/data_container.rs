//! This module defines the data structures that flow through the extraction pipeline: metadata records,
//! measurements with their datasets, time-domain waveforms and the final extraction result.

use crate::enrichment::CompoundInfo;
use crate::math_tools::{peak_index, WindowKind};
use dotthz::DotthzMetaData;
use indexmap::IndexMap;
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Keys of the metadata fields that have a dedicated slot in [`MetadataRecord`].
pub const WELL_KNOWN_KEYS: [&str; 9] = [
    "user",
    "email",
    "institution",
    "description",
    "version",
    "instrument",
    "mode",
    "date",
    "time",
];

/// Custom key holding the ORCID of a dotThz file.
pub const ORCID_KEY: &str = "orcid";

/// A present metadata value. Empty values are represented by `None` wherever a `MetaValue` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl MetaValue {
    /// Numeric interpretation of the value. Text is accepted if it parses as a float after trimming.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(x) => Some(*x),
            MetaValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Converts a JSON value. `null` and values that are neither strings nor numbers are empty.
    pub fn from_json(value: &Value) -> Option<MetaValue> {
        match value {
            Value::String(s) => Some(MetaValue::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(MetaValue::Number),
            Value::Null => None,
            other => {
                log::warn!("unsupported metadata value {other}, treating it as empty");
                None
            }
        }
    }

    pub fn to_json(value: &Option<MetaValue>) -> Value {
        match value {
            Some(MetaValue::Text(s)) => Value::String(s.clone()),
            Some(MetaValue::Number(x)) => serde_json::Number::from_f64(*x)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            None => Value::Null,
        }
    }
}

impl Display for MetaValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaValue::Number(x) => write!(f, "{x}"),
            MetaValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Metadata of a measurement.
///
/// The well-known fields have dedicated slots, everything else lives in the ordered custom map `md`.
/// A field that exists but holds no value is `None`; a custom key that does not exist is simply not
/// part of `md`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    pub user: Option<String>,
    pub email: Option<String>,
    pub institution: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub instrument: Option<String>,
    pub mode: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub md: IndexMap<String, Option<MetaValue>>,
}

impl MetadataRecord {
    fn well_known_slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "user" => Some(&mut self.user),
            "email" => Some(&mut self.email),
            "institution" => Some(&mut self.institution),
            "description" => Some(&mut self.description),
            "version" => Some(&mut self.version),
            "instrument" => Some(&mut self.instrument),
            "mode" => Some(&mut self.mode),
            "date" => Some(&mut self.date),
            "time" => Some(&mut self.time),
            _ => None,
        }
    }

    /// Well-known fields in their canonical order.
    pub fn well_known(&self) -> [(&'static str, &Option<String>); 9] {
        [
            ("user", &self.user),
            ("email", &self.email),
            ("institution", &self.institution),
            ("description", &self.description),
            ("version", &self.version),
            ("instrument", &self.instrument),
            ("mode", &self.mode),
            ("date", &self.date),
            ("time", &self.time),
        ]
    }

    /// Stores a value under `key`, routing well-known keys to their slot.
    pub fn insert(&mut self, key: &str, value: Option<MetaValue>) {
        match self.well_known_slot(key) {
            Some(slot) => *slot = value.map(|v| v.to_string()),
            None => {
                self.md.insert(key.to_string(), value);
            }
        }
    }

    /// Looks up a custom key. The outer `Option` tells whether the key exists, the inner one whether it
    /// holds a value.
    pub fn custom(&self, key: &str) -> Option<&Option<MetaValue>> {
        self.md.get(key)
    }

    /// Well-known fields merged with the custom fields. Empty values stay `None`.
    pub fn sanitized(&self) -> IndexMap<String, Option<MetaValue>> {
        let mut merged: IndexMap<String, Option<MetaValue>> = self
            .well_known()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.clone().map(MetaValue::Text)))
            .collect();
        for (key, value) in &self.md {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Maps dotThz metadata. Every dotThz value is text, blank text becomes an empty value. The ORCID
    /// has no slot of its own and is kept as the custom key `orcid`.
    pub fn from_dotthz(meta_data: &DotthzMetaData) -> Self {
        let mut record = MetadataRecord::default();
        for (key, value) in [
            ("user", &meta_data.user),
            ("email", &meta_data.email),
            ("institution", &meta_data.institution),
            ("description", &meta_data.description),
            ("version", &meta_data.version),
            ("instrument", &meta_data.instrument),
            ("mode", &meta_data.mode),
            ("date", &meta_data.date),
            ("time", &meta_data.time),
        ] {
            record.insert(key, non_blank(value));
        }
        if let Some(orcid) = non_blank(&meta_data.orcid) {
            record.md.insert(ORCID_KEY.to_string(), Some(orcid));
        }
        for (key, value) in &meta_data.md {
            record.md.insert(key.clone(), non_blank(value));
        }
        record
    }

    /// Inverse of [`MetadataRecord::from_dotthz`]. Empty values are written as empty text and numbers
    /// in their shortest form.
    pub fn to_dotthz(&self) -> DotthzMetaData {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let mut meta_data = DotthzMetaData {
            user: text(&self.user),
            email: text(&self.email),
            institution: text(&self.institution),
            description: text(&self.description),
            version: text(&self.version),
            instrument: text(&self.instrument),
            mode: text(&self.mode),
            date: text(&self.date),
            time: text(&self.time),
            ..DotthzMetaData::default()
        };
        for (key, value) in &self.md {
            let value = value.as_ref().map(|v| v.to_string()).unwrap_or_default();
            if key == ORCID_KEY {
                meta_data.orcid = value;
            } else {
                meta_data.md.insert(key.clone(), value);
            }
        }
        meta_data
    }

    /// Parses a flat JSON object where every key is routed through [`MetadataRecord::insert`].
    pub fn from_flat_json(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "metadata must be a JSON object".to_string())?;
        let mut record = MetadataRecord::default();
        for (key, value) in object {
            record.insert(key, MetaValue::from_json(value));
        }
        Ok(record)
    }
}

fn non_blank(value: &str) -> Option<MetaValue> {
    (!value.trim().is_empty()).then(|| MetaValue::Text(value.to_string()))
}

/// The window that was applied to a waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedWindow {
    pub kind: WindowKind,
    pub half_width: usize,
    pub center_time: f64,
}

/// A time-domain trace: equally long time and amplitude channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub time: Array1<f64>,
    pub amplitude: Array1<f64>,
    /// Set by the windowing stage.
    pub window: Option<AppliedWindow>,
}

impl Waveform {
    /// Creates a waveform, `None` if the channels differ in length.
    pub fn new(time: Array1<f64>, amplitude: Array1<f64>) -> Option<Self> {
        if time.len() != amplitude.len() {
            return None;
        }
        Some(Waveform {
            time,
            amplitude,
            window: None,
        })
    }

    /// Builds a waveform from an `(n, 2)` dataset, `None` for any other shape.
    pub fn from_columns(dataset: &Array2<f64>) -> Option<Self> {
        if dataset.ncols() != 2 {
            return None;
        }
        Waveform::new(
            dataset.slice(s![.., 0]).to_owned(),
            dataset.slice(s![.., 1]).to_owned(),
        )
    }

    /// The `(n, 2)` dataset layout used in the container.
    pub fn to_columns(&self) -> Array2<f64> {
        ndarray::stack(Axis(1), &[self.time.view(), self.amplitude.view()])
            .unwrap_or_else(|_| Array2::zeros((0, 2)))
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// `true` if the time axis is strictly increasing.
    pub fn is_time_monotonic(&self) -> bool {
        self.time
            .iter()
            .zip(self.time.iter().skip(1))
            .all(|(a, b)| b > a)
    }

    /// Index and time of the sample with the largest absolute amplitude.
    pub fn peak(&self) -> Option<(usize, f64)> {
        peak_index(self.amplitude.view()).map(|i| (i, self.time[i]))
    }
}

/// A single measurement: named `(n, 2)` datasets of `(time, amplitude)` and the metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub datasets: IndexMap<String, Array2<f64>>,
    pub meta_data: MetadataRecord,
}

impl Measurement {
    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    /// The dataset `name` as a waveform, `None` if it does not exist or is not two-column.
    pub fn waveform(&self, name: &str) -> Option<Waveform> {
        self.datasets.get(name).and_then(Waveform::from_columns)
    }
}

/// Result of one extraction.
///
/// `frequency`, `refractive_index` and `absorption_coefficient` always have the same length.
/// Frequencies are in THz (reciprocal of the ps time axis), the absorption coefficient in 1/mm.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub measurement: String,
    pub sample_dataset: String,
    pub reference_dataset: String,
    pub frequency: Vec<f64>,
    pub refractive_index: Vec<f64>,
    pub absorption_coefficient: Vec<f64>,
    /// Sample and reference after windowing.
    pub sample: Waveform,
    pub reference: Waveform,
    /// Sample and reference as read from the container.
    pub raw_sample: Waveform,
    pub raw_reference: Waveform,
    pub thickness_mm: f64,
    pub metadata: IndexMap<String, Option<MetaValue>>,
    pub compound: Option<CompoundInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_insert_routes_well_known_keys() {
        let mut record = MetadataRecord::default();
        record.insert("user", Some(MetaValue::Text("Alice".to_string())));
        record.insert("thickness [mm]", Some(MetaValue::Number(1.2)));
        record.insert("T_S [K]", None);
        assert_eq!(record.user.as_deref(), Some("Alice"));
        assert!(!record.md.contains_key("user"));
        assert_eq!(
            record.custom("thickness [mm]"),
            Some(&Some(MetaValue::Number(1.2)))
        );
        assert_eq!(record.custom("T_S [K]"), Some(&None));
        assert_eq!(record.custom("missing"), None);
    }

    #[test]
    fn test_dotthz_metadata_blank_values_are_empty() {
        let mut meta_data = DotthzMetaData {
            user: "Bob".to_string(),
            email: " ".to_string(),
            orcid: "0000-0002-1825-0097".to_string(),
            ..DotthzMetaData::default()
        };
        meta_data
            .md
            .insert("thickness [mm]".to_string(), "0.5".to_string());
        meta_data.md.insert("comment".to_string(), String::new());

        let record = MetadataRecord::from_dotthz(&meta_data);
        assert_eq!(record.user.as_deref(), Some("Bob"));
        assert_eq!(record.email, None);
        assert_eq!(record.instrument, None);
        assert_eq!(
            record.custom("thickness [mm]"),
            Some(&Some(MetaValue::Text("0.5".to_string())))
        );
        assert_eq!(record.custom("comment"), Some(&None));
        assert_eq!(
            record.custom(ORCID_KEY),
            Some(&Some(MetaValue::Text("0000-0002-1825-0097".to_string())))
        );

        let back = record.to_dotthz();
        assert_eq!(back.user, "Bob");
        assert_eq!(back.email, "");
        assert_eq!(back.orcid, meta_data.orcid);
        assert_eq!(back.md.get("thickness [mm]").map(String::as_str), Some("0.5"));
        assert_eq!(back.md.get("comment").map(String::as_str), Some(""));
        assert!(!back.md.contains_key(ORCID_KEY));
    }

    #[test]
    fn test_numbers_are_written_as_text() {
        let mut record = MetadataRecord::default();
        record.insert("T [K]", Some(MetaValue::Number(295.0)));
        record.insert("P [mbar]", Some(MetaValue::Number(0.25)));
        let meta_data = record.to_dotthz();
        assert_eq!(meta_data.md.get("T [K]").map(String::as_str), Some("295"));
        assert_eq!(meta_data.md.get("P [mbar]").map(String::as_str), Some("0.25"));
    }

    #[test]
    fn test_sanitized_merges_well_known_and_custom() {
        let mut record = MetadataRecord::default();
        record.insert("instrument", Some(MetaValue::Text("TeraK15".to_string())));
        record.insert("P [mbar]", Some(MetaValue::Number(950.0)));
        let merged = record.sanitized();
        assert_eq!(
            merged["instrument"],
            Some(MetaValue::Text("TeraK15".to_string()))
        );
        assert_eq!(merged["user"], None);
        assert_eq!(merged["P [mbar]"], Some(MetaValue::Number(950.0)));
        assert_eq!(merged.len(), WELL_KNOWN_KEYS.len() + 1);
    }

    #[test]
    fn test_meta_value_numeric_text() {
        assert_eq!(MetaValue::Text(" 1.5 ".to_string()).as_f64(), Some(1.5));
        assert_eq!(MetaValue::Text("abc".to_string()).as_f64(), None);
        assert_eq!(MetaValue::Number(2.0).as_f64(), Some(2.0));
    }

    #[test]
    fn test_waveform_columns() {
        let dataset = array![[0.0, 1.0], [0.1, -3.0], [0.2, 2.0]];
        let waveform = Waveform::from_columns(&dataset).unwrap();
        assert_eq!(waveform.len(), 3);
        assert!(waveform.is_time_monotonic());
        assert_eq!(waveform.peak(), Some((1, 0.1)));
        assert_eq!(waveform.to_columns(), dataset);
        assert!(Waveform::from_columns(&Array2::zeros((3, 3))).is_none());
        assert!(Waveform::new(array![0.0, 1.0], array![1.0]).is_none());
    }
}
