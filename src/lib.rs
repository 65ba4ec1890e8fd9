//! Extraction of the refractive index and the absorption coefficient of a sample from paired
//! sample/reference THz time-domain waveforms.

pub mod config;
pub mod data_container;
pub mod enrichment;
pub mod error;
pub mod extraction;
pub mod inversion;
pub mod io;
pub mod math_tools;
pub mod record;
pub mod resolver;
pub mod table;
pub mod thickness;
pub mod windowing;

pub use config::ExtractionConfig;
pub use data_container::{ExtractionResult, Measurement, MetaValue, MetadataRecord, Waveform};
pub use error::ExtractionError;
pub use extraction::{enrich, extract, extract_batch, extract_with_config, ingest, Upload};
pub use record::SpectrumRecord;
