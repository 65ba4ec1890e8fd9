use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use thz_extract::enrichment::CompoundTable;
use thz_extract::io::{save_result_to_csv, write_result_csv};
use thz_extract::math_tools::WindowKind;
use thz_extract::table::IntensityKind;
use thz_extract::{enrich, extract_with_config, ingest, ExtractionConfig, SpectrumRecord, Upload};

#[derive(Parser)]
#[command(
    name = "thz-extract",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"),
    about = "Refractive index and absorption coefficient from THz-TDS measurements"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the optical constants of a measurement container.
    Extract {
        file: PathBuf,
        /// Sample thickness in mm, used if the metadata has none.
        #[arg(long)]
        thickness: Option<String>,
        /// JSON config file, the flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        measurement: Option<String>,
        #[arg(long)]
        upsampling: Option<u32>,
        /// Lower band edge in THz.
        #[arg(long)]
        freq_min: Option<f64>,
        /// Upper band edge in THz.
        #[arg(long)]
        freq_max: Option<f64>,
        /// Window half-width in samples.
        #[arg(long)]
        half_width: Option<usize>,
        #[arg(long, value_enum)]
        window: Option<WindowArg>,
        /// Fabry–Pérot refinement iterations, 0 disables the refinement.
        #[arg(long)]
        iterations: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Material name stored in the record and used for the compound lookup.
        #[arg(long)]
        material: Option<String>,
        /// JSON array of known compounds.
        #[arg(long)]
        compounds: Option<PathBuf>,
    },
    /// Convert a two-column text table into a record.
    Table {
        file: PathBuf,
        #[arg(long, value_enum)]
        kind: KindArg,
        /// The first line of the file holds the metadata JSON object.
        #[arg(long)]
        combined: bool,
        /// File holding the metadata JSON object.
        #[arg(long, conflicts_with = "combined")]
        metadata: Option<PathBuf>,
        #[arg(long)]
        material: String,
    },
    /// Export a stored record as a measurement container.
    Export {
        record: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Name of the measurement inside the container, the material name by default.
        #[arg(long)]
        measurement: Option<String>,
    },
    /// Write the default config to a file.
    InitConfig { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum WindowArg {
    AdaptedBlackman,
    Blackman,
    Hanning,
}

impl From<WindowArg> for WindowKind {
    fn from(value: WindowArg) -> Self {
        match value {
            WindowArg::AdaptedBlackman => WindowKind::AdaptedBlackman,
            WindowArg::Blackman => WindowKind::Blackman,
            WindowArg::Hanning => WindowKind::Hanning,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    RefractiveIndex,
    AbsorptionCoefficient,
}

impl From<KindArg> for IntensityKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::RefractiveIndex => IntensityKind::RefractiveIndex,
            KindArg::AbsorptionCoefficient => IntensityKind::AbsorptionCoefficient,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn run_extract(
    file: &Path,
    thickness: Option<&str>,
    config: &ExtractionConfig,
    format: OutputFormat,
    output: Option<&Path>,
    material: Option<&str>,
    compounds: Option<&Path>,
) -> Result<()> {
    let bytes = read(file)?;
    let mut result = match extract_with_config(&bytes, thickness, config) {
        Ok(result) => result,
        Err(err) if err.needs_thickness_override() => {
            return Err(err).context("rerun with --thickness <mm>");
        }
        Err(err) => {
            return Err(err).with_context(|| format!("extraction of {} failed", file.display()))
        }
    };
    let material = material.unwrap_or(&result.measurement).to_string();

    if let Some(path) = compounds {
        match CompoundTable::load(path) {
            Ok(table) => result = enrich(result, &material, &table),
            Err(err) => log::warn!("skipping compound lookup: {err}"),
        }
    }

    match format {
        OutputFormat::Csv => match output {
            Some(path) => save_result_to_csv(&result, path)
                .map_err(|e| anyhow::anyhow!("cannot write {}: {e}", path.display()))?,
            None => {
                let mut wtr = csv::Writer::from_writer(std::io::stdout());
                write_result_csv(&result, &mut wtr)?;
            }
        },
        OutputFormat::Json => {
            let record = SpectrumRecord::from_result(&result, &material);
            emit(&record.to_json()?, output)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Extract {
            file,
            thickness,
            config,
            measurement,
            upsampling,
            freq_min,
            freq_max,
            half_width,
            window,
            iterations,
            format,
            output,
            material,
            compounds,
        } => {
            let mut settings = match &config {
                Some(path) => ExtractionConfig::load(path)
                    .with_context(|| format!("cannot load config {}", path.display()))?,
                None => ExtractionConfig::default(),
            };
            if measurement.is_some() {
                settings.measurement = measurement;
            }
            if let Some(upsampling) = upsampling {
                settings.upsampling = upsampling;
            }
            if let Some(freq_min) = freq_min {
                settings.freq_min = freq_min;
            }
            if let Some(freq_max) = freq_max {
                settings.freq_max = freq_max;
            }
            if let Some(half_width) = half_width {
                settings.window_half_width = half_width;
            }
            if let Some(window) = window {
                settings.window_kind = window.into();
            }
            if let Some(iterations) = iterations {
                settings.fabry_perot_iterations = iterations;
            }
            run_extract(
                &file,
                thickness.as_deref(),
                &settings,
                format,
                output.as_deref(),
                material.as_deref(),
                compounds.as_deref(),
            )
        }
        Command::Table {
            file,
            kind,
            combined,
            metadata,
            material,
        } => {
            let bytes = read(&file)?;
            let metadata_json = match &metadata {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("cannot read {}", path.display()))?,
                ),
                None => None,
            };
            let upload = if combined {
                Upload::Combined {
                    bytes: &bytes,
                    kind: kind.into(),
                }
            } else {
                Upload::Table {
                    bytes: &bytes,
                    kind: kind.into(),
                    metadata_json: metadata_json.as_deref(),
                }
            };
            let record = ingest(upload, &material, &ExtractionConfig::default())
                .with_context(|| format!("cannot parse {}", file.display()))?;
            emit(&record.to_json()?, None)
        }
        Command::Export {
            record,
            output,
            measurement,
        } => {
            let text = std::fs::read_to_string(&record)
                .with_context(|| format!("cannot read {}", record.display()))?;
            let record = SpectrumRecord::from_json(&text)?;
            let name = measurement.unwrap_or_else(|| record.material.clone());
            let bytes = record.to_container_bytes(&name)?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("cannot write {}", output.display()))?;
            log::info!("exported '{name}' to {}", output.display());
            Ok(())
        }
        Command::InitConfig { path } => {
            ExtractionConfig::default()
                .save(&path)
                .with_context(|| format!("cannot write {}", path.display()))?;
            log::info!("wrote default config to {}", path.display());
            Ok(())
        }
    }
}
