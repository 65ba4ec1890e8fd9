//! Reading and writing of `.thz` measurement containers, plus the CSV export of extraction results.
//!
//! Containers are dotThz files (HDF5). Every measurement is a group carrying the dotThz metadata and
//! one `(n, 2)` dataset of `(time, amplitude)` per trace. The pipeline works on in-memory bytes, so
//! those pass through a scratch file in a temporary directory.

use crate::data_container::{ExtractionResult, Measurement, MetadataRecord};
use crate::error::ContainerError;
use csv::WriterBuilder;
use dotthz::DotthzFile;
use indexmap::IndexMap;
use ndarray::Array2;
use std::error::Error;
use std::io::Write;
use std::path::Path;

const SCRATCH_FILE: &str = "container.thz";

/// An opened container: measurements in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    measurements: IndexMap<String, Measurement>,
}

impl Container {
    /// Decodes a container from raw bytes.
    pub fn open(bytes: &[u8]) -> Result<Self, ContainerError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(SCRATCH_FILE);
        std::fs::write(&path, bytes)?;
        Container::load(&path)
    }

    /// Reads a `.thz` file.
    pub fn load(path: &Path) -> Result<Self, ContainerError> {
        let file = DotthzFile::load(&path.to_path_buf()).map_err(thz_error)?;
        let mut measurements: IndexMap<String, Measurement> = IndexMap::new();

        for name in file.get_group_names().map_err(thz_error)? {
            let meta_data = file
                .get_meta_data(&name)
                .map_err(|e| malformed(&name, e))?;
            let mut datasets = IndexMap::new();
            for dataset in file
                .get_dataset_names(&name)
                .map_err(|e| malformed(&name, e))?
            {
                let entry = format!("{name}/{dataset}");
                let data: Array2<f64> = file
                    .get_dataset(&name, &dataset)
                    .map_err(|e| malformed(&entry, e))?
                    .read_2d()
                    .map_err(|e| malformed(&entry, e))?;
                datasets.insert(dataset, data);
            }
            measurements.insert(
                name,
                Measurement {
                    datasets,
                    meta_data: MetadataRecord::from_dotthz(&meta_data),
                },
            );
        }

        if measurements.is_empty() {
            return Err(ContainerError::NoMeasurements);
        }
        log::debug!(
            "opened container with {} measurement(s): {:?}",
            measurements.len(),
            measurements.keys().collect::<Vec<_>>()
        );
        Ok(Container { measurements })
    }

    /// Measurement names in file order.
    pub fn measurement_names(&self) -> Vec<String> {
        self.measurements.keys().cloned().collect()
    }

    pub fn get_measurement(&self, name: &str) -> Result<&Measurement, ContainerError> {
        self.measurements
            .get(name)
            .ok_or_else(|| ContainerError::NotFound(name.to_string()))
    }

    /// The first measurement of the file.
    pub fn first_measurement(&self) -> Result<(&str, &Measurement), ContainerError> {
        self.measurements
            .first()
            .map(|(name, measurement)| (name.as_str(), measurement))
            .ok_or(ContainerError::NoMeasurements)
    }

    pub fn insert(&mut self, name: &str, measurement: Measurement) {
        self.measurements.insert(name.to_string(), measurement);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

fn thz_error(err: impl ToString) -> ContainerError {
    ContainerError::Thz(err.to_string())
}

fn malformed(entry: &str, reason: impl ToString) -> ContainerError {
    ContainerError::Malformed {
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_name(name: &str) -> Result<(), ContainerError> {
    if name.is_empty() || name.contains('/') {
        return Err(ContainerError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Saves all measurements of `container` as a `.thz` file.
pub fn save_container(container: &Container, path: &Path) -> Result<(), ContainerError> {
    for (name, measurement) in &container.measurements {
        validate_name(name)?;
        for (dataset, data) in &measurement.datasets {
            validate_name(dataset)?;
            if data.ncols() != 2 {
                return Err(malformed(
                    &format!("{name}/{dataset}"),
                    format!("dataset has {} columns, expected 2", data.ncols()),
                ));
            }
        }
    }

    let mut file = DotthzFile::create(&path.to_path_buf()).map_err(thz_error)?;
    for (name, measurement) in &container.measurements {
        file.add_group(name, &measurement.meta_data.to_dotthz())
            .map_err(|e| malformed(name, e))?;
        for (dataset, data) in &measurement.datasets {
            file.add_dataset(name, dataset, data.view())
                .map_err(|e| malformed(&format!("{name}/{dataset}"), e))?;
        }
    }
    Ok(())
}

/// Encodes all measurements of `container` as the bytes of a `.thz` file.
pub fn write_container(container: &Container) -> Result<Vec<u8>, ContainerError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(SCRATCH_FILE);
    save_container(container, &path)?;
    Ok(std::fs::read(&path)?)
}

/// Encodes a single measurement as a container.
pub fn write(measurement_name: &str, measurement: &Measurement) -> Result<Vec<u8>, ContainerError> {
    let mut container = Container::default();
    container.insert(measurement_name, measurement.clone());
    write_container(&container)
}

/// Saves the spectra of an extraction result as CSV with the columns frequency, refractive index and
/// absorption coefficient.
pub fn save_result_to_csv(result: &ExtractionResult, file_path: &Path) -> Result<(), Box<dyn Error>> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(file_path)?;
    write_result_csv(result, &mut wtr)?;
    Ok(())
}

/// Writes the spectra of an extraction result as CSV to any writer.
pub fn write_result_csv<W: Write>(
    result: &ExtractionResult,
    wtr: &mut csv::Writer<W>,
) -> Result<(), csv::Error> {
    wtr.write_record(["Frequency/THz", "Refractive index", "Absorption coefficient/mm^-1"])?;
    for ((f, n), alpha) in result
        .frequency
        .iter()
        .zip(result.refractive_index.iter())
        .zip(result.absorption_coefficient.iter())
    {
        wtr.write_record([f.to_string(), n.to_string(), alpha.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::MetaValue;
    use ndarray::array;

    fn measurement() -> Measurement {
        let mut meta_data = MetadataRecord::default();
        meta_data.insert("user", Some(MetaValue::Text("Alice".to_string())));
        meta_data.insert("thickness [mm]", Some(MetaValue::Number(0.75)));
        meta_data.insert("comment", None);
        let mut datasets = IndexMap::new();
        datasets.insert("Sample".to_string(), array![[0.0, 0.5], [0.05, -1.25]]);
        datasets.insert("Reference".to_string(), array![[0.0, 1.0], [0.05, 2.0]]);
        Measurement {
            datasets,
            meta_data,
        }
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[test]
    fn test_write_then_open() {
        let bytes = write("Measurement 1", &measurement()).unwrap();
        let container = Container::open(&bytes).unwrap();
        assert_eq!(container.measurement_names(), vec!["Measurement 1"]);
        let read = container.get_measurement("Measurement 1").unwrap();
        assert_eq!(sorted(read.dataset_names()), vec!["Reference", "Sample"]);
        assert_eq!(read.datasets["Sample"], array![[0.0, 0.5], [0.05, -1.25]]);
        assert_eq!(read.datasets["Reference"], array![[0.0, 1.0], [0.05, 2.0]]);

        // dotThz stores every metadata value as text, empty text is an empty value
        assert_eq!(read.meta_data.user.as_deref(), Some("Alice"));
        assert_eq!(read.meta_data.email, None);
        assert_eq!(
            read.meta_data.custom("thickness [mm]"),
            Some(&Some(MetaValue::Text("0.75".to_string())))
        );
        assert_eq!(read.meta_data.custom("comment"), Some(&None));
    }

    #[test]
    fn test_save_then_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.thz");
        let mut container = Container::default();
        container.insert("b", measurement());
        container.insert("a", measurement());
        save_container(&container, &path).unwrap();

        let loaded = Container::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(sorted(loaded.measurement_names()), vec!["a", "b"]);
        let (first, _) = loaded.first_measurement().unwrap();
        assert_eq!(first, loaded.measurement_names()[0]);
    }

    #[test]
    fn test_unknown_measurement() {
        let container = Container::open(&write("m", &measurement()).unwrap()).unwrap();
        assert!(matches!(
            container.get_measurement("other"),
            Err(ContainerError::NotFound(name)) if name == "other"
        ));
    }

    #[test]
    fn test_empty_and_garbage_files() {
        let empty = write_container(&Container::default()).unwrap();
        assert!(matches!(
            Container::open(&empty),
            Err(ContainerError::NoMeasurements)
        ));
        assert!(matches!(
            Container::open(b"not a thz file"),
            Err(ContainerError::Thz(_))
        ));
        // a bare HDF5 signature without a superblock behind it
        let mut truncated = b"\x89HDF\r\n\x1a\n".to_vec();
        truncated.resize(64, 0);
        assert!(matches!(
            Container::open(&truncated),
            Err(ContainerError::Thz(_))
        ));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        assert!(matches!(
            write("a/b", &measurement()),
            Err(ContainerError::InvalidName(_))
        ));
        assert!(matches!(
            write("", &measurement()),
            Err(ContainerError::InvalidName(_))
        ));
    }

    #[test]
    fn test_dataset_must_have_two_columns() {
        let mut wide = measurement();
        wide.datasets
            .insert("Sample".to_string(), Array2::zeros((4, 3)));
        assert!(matches!(
            write("m", &wide),
            Err(ContainerError::Malformed { entry, .. }) if entry == "m/Sample"
        ));
    }
}
