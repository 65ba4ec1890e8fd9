//! Error types for every stage of the extraction pipeline.
//!
//! Each stage owns its own error enum so that callers can match on the exact cause. The
//! orchestrator wraps them in [`ExtractionError`] without altering the inner value, which
//! means `Display` and `source()` of the original error are always preserved.

use thiserror::Error;

/// Failures while reading or writing the measurement container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The file was readable but holds no measurement.
    #[error("the container does not hold any measurement")]
    NoMeasurements,
    /// The requested measurement does not exist in the file.
    #[error("measurement '{0}' not found in container")]
    NotFound(String),
    /// A group or dataset of the file could not be decoded.
    #[error("malformed container entry '{entry}': {reason}")]
    Malformed { entry: String, reason: String },
    /// A measurement or dataset name cannot be stored as an HDF5 group or dataset.
    #[error("invalid name '{0}': names must be non-empty and must not contain '/'")]
    InvalidName(String),
    /// The bytes are not a readable dotThz file, or the file could not be created.
    #[error("dotThz error: {0}")]
    Thz(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while choosing the sample and reference datasets of a measurement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no sample dataset found (available datasets: {available:?})")]
    NoSample { available: Vec<String> },
    #[error("no reference dataset found (available datasets: {available:?})")]
    NoReference { available: Vec<String> },
    #[error("more than one sample dataset candidate: {0:?}")]
    AmbiguousSample(Vec<String>),
    #[error("more than one reference dataset candidate: {0:?}")]
    AmbiguousReference(Vec<String>),
}

/// Why no thickness could be taken from the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThicknessCause {
    /// The thickness key is not part of the metadata.
    KeyAbsent,
    /// The key exists but holds no value.
    KeyEmpty,
    /// The key holds a value that is not a number.
    Unparsable(String),
}

impl std::fmt::Display for ThicknessCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThicknessCause::KeyAbsent => write!(f, "the metadata has no thickness entry"),
            ThicknessCause::KeyEmpty => write!(f, "the thickness entry of the metadata is empty"),
            ThicknessCause::Unparsable(raw) => {
                write!(f, "the thickness entry '{raw}' of the metadata is not a number")
            }
        }
    }
}

/// Failures while resolving the sample thickness.
#[derive(Debug, Error, PartialEq)]
pub enum ThicknessError {
    /// No usable thickness in the metadata and no override was given.
    #[error("sample thickness required: {0}")]
    Required(ThicknessCause),
    /// The caller-supplied override is not a number.
    #[error("thickness override '{0}' is not a number")]
    InvalidOverride(String),
    /// The resolved thickness is not a finite, strictly positive length.
    #[error("thickness must be a positive length in mm, got {0}")]
    Invalid(f64),
}

/// Failures of the windowing stage.
#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("cannot window an empty waveform")]
    EmptyWaveform,
    #[error("window half-width must be at least one sample")]
    ZeroHalfWidth,
    /// The peak of the pair lies outside the time span of one of the waveforms.
    #[error("window centre t = {center_time} lies outside the waveform span [{start}, {end}]")]
    CentreOutsideWaveform { center_time: f64, start: f64, end: f64 },
}

/// Failures of the transfer function inversion.
#[derive(Debug, Error, PartialEq)]
pub enum InversionError {
    /// The transfer function (or a quantity derived from it) is not finite at this frequency.
    #[error("transfer function is singular at frequency {frequency}")]
    SingularTransferFunction { frequency: f64 },
    /// A stored inversion output lacks one of its arrays.
    #[error("inversion output is missing the '{0}' array")]
    MissingOutputKey(String),
    #[error("invalid frequency band [{min}, {max}]")]
    InvalidBand { min: f64, max: f64 },
    #[error("no frequency bin lies inside [{min}, {max}]")]
    EmptyBand { min: f64, max: f64 },
    #[error("upsampling factor must be at least 1")]
    InvalidUpsampling,
    #[error("thickness must be a positive length in mm, got {0}")]
    InvalidThickness(f64),
    #[error("invalid time axis: {0}")]
    InvalidTimeAxis(String),
    #[error("fft failed: {0}")]
    Fft(String),
}

/// Failures while parsing text uploads.
#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("row {row}: both values must be numbers, found {values:?}")]
    NonNumericField { row: usize, values: Vec<String> },
    #[error("row {row}: expected exactly two values (frequency, intensity), found {found}")]
    WrongColumnCount { row: usize, found: usize },
    #[error("the upload is not valid UTF-8 text")]
    Encoding,
    #[error("the upload does not contain any data row")]
    Empty,
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("csv error: {0}")]
    Csv(String),
    /// A stored record is not valid JSON or has fields of the wrong type.
    #[error("invalid record: {0}")]
    Json(String),
}

/// Failures while loading the extraction configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any failure of an extraction attempt.
///
/// The component error is kept as is, so `matches!(err, ExtractionError::Thickness(ThicknessError::Required(_)))`
/// is the way a caller detects that it should ask for a thickness override.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Thickness(#[from] ThicknessError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Inversion(#[from] InversionError),
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl ExtractionError {
    /// `true` if resubmitting with a thickness override can make the extraction succeed.
    pub fn needs_thickness_override(&self) -> bool {
        matches!(self, ExtractionError::Thickness(ThicknessError::Required(_)))
    }
}
