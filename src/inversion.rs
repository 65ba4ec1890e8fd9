//! Inversion of the uniform-slab transmission model.
//!
//! The transfer function `H(f) = E_sample(f) / E_reference(f)` of a slab of thickness `d` and complex
//! refractive index `ñ = n - iκ` is
//!
//! ```text
//! H = 4ñ / (ñ + 1)² · exp(-i(ñ - 1)ωd/c) · 1 / (1 - ρ² exp(-2iñωd/c)),   ρ = (ñ - 1) / (ñ + 1)
//! ```
//!
//! in the `exp(-iωt)` convention of the forward FFT. A first-order estimate ignores the echoes and the
//! imaginary part of the Fresnel factor, the Fabry–Pérot refinement then re-solves the exponential term
//! with the full Fresnel and echo factors of the previous estimate.
//!
//! Time is in ps, frequencies in THz and the thickness in mm.

use crate::data_container::Waveform;
use crate::error::InversionError;
use crate::math_tools::{linear_fit, unwrap_phase};
use realfft::num_complex::Complex64;
use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// Speed of light in mm/ps.
pub const SPEED_OF_LIGHT_MM_PER_PS: f64 = 0.299_792_458;

/// Default number of Fabry–Pérot refinement iterations.
pub const DEFAULT_FABRY_PEROT_ITERATIONS: usize = 20;

/// The refinement stops once no bin changes by more than this.
const FABRY_PEROT_TOLERANCE: f64 = 1e-10;

/// Relative deviation of a single time step from the mean step that is still considered uniform.
const TIME_STEP_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InversionSettings {
    /// The transforms are zero-padded to `upsampling × max(len)` samples.
    pub upsampling: u32,
    /// Lower band edge in THz.
    pub freq_min: f64,
    /// Upper band edge in THz.
    pub freq_max: f64,
    /// 0 returns the first-order estimate.
    pub fabry_perot_iterations: usize,
}

impl Default for InversionSettings {
    fn default() -> Self {
        InversionSettings {
            upsampling: 3,
            freq_min: 0.2,
            freq_max: 3.0,
            fabry_perot_iterations: DEFAULT_FABRY_PEROT_ITERATIONS,
        }
    }
}

/// Optical constants on the in-band frequency bins.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionOutput {
    /// THz, ascending.
    pub frequency: Vec<f64>,
    pub refractive_index: Vec<f64>,
    /// 1/mm.
    pub absorption_coefficient: Vec<f64>,
}

impl InversionOutput {
    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }
}

/// Inverts the slab model with the default number of Fabry–Pérot iterations.
pub fn invert(
    sample: &Waveform,
    reference: &Waveform,
    thickness_mm: f64,
    upsampling: u32,
    freq_min: f64,
    freq_max: f64,
) -> Result<InversionOutput, InversionError> {
    invert_with(
        sample,
        reference,
        thickness_mm,
        &InversionSettings {
            upsampling,
            freq_min,
            freq_max,
            fabry_perot_iterations: DEFAULT_FABRY_PEROT_ITERATIONS,
        },
    )
}

/// Mean time step of a waveform, checking that every step is close to it.
fn time_step(waveform: &Waveform, label: &str) -> Result<f64, InversionError> {
    let n = waveform.len();
    if n < 2 {
        return Err(InversionError::InvalidTimeAxis(format!(
            "{label} has {n} samples, at least 2 are required"
        )));
    }
    let dt = (waveform.time[n - 1] - waveform.time[0]) / (n - 1) as f64;
    if !dt.is_finite() || dt <= 0.0 {
        return Err(InversionError::InvalidTimeAxis(format!(
            "{label} time axis is not increasing"
        )));
    }
    for (i, (a, b)) in waveform
        .time
        .iter()
        .zip(waveform.time.iter().skip(1))
        .enumerate()
    {
        if ((b - a) - dt).abs() > TIME_STEP_TOLERANCE * dt {
            return Err(InversionError::InvalidTimeAxis(format!(
                "{label} time step {} at sample {i} deviates from the mean step {dt}",
                b - a
            )));
        }
    }
    Ok(dt)
}

fn validate(
    sample: &Waveform,
    reference: &Waveform,
    thickness_mm: f64,
    settings: &InversionSettings,
) -> Result<f64, InversionError> {
    let (min, max) = (settings.freq_min, settings.freq_max);
    if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
        return Err(InversionError::InvalidBand { min, max });
    }
    if settings.upsampling == 0 {
        return Err(InversionError::InvalidUpsampling);
    }
    if !thickness_mm.is_finite() || thickness_mm <= 0.0 {
        return Err(InversionError::InvalidThickness(thickness_mm));
    }
    let dt_sample = time_step(sample, "sample")?;
    let dt_reference = time_step(reference, "reference")?;
    if (dt_sample - dt_reference).abs() > TIME_STEP_TOLERANCE * dt_reference {
        return Err(InversionError::InvalidTimeAxis(format!(
            "sample step {dt_sample} differs from reference step {dt_reference}"
        )));
    }
    Ok(dt_reference)
}

/// Zero-padded real FFT of the amplitude channel.
fn spectrum(
    planner: &mut RealFftPlanner<f64>,
    waveform: &Waveform,
    n: usize,
) -> Result<Vec<Complex64>, InversionError> {
    let r2c = planner.plan_fft_forward(n);
    let mut input = r2c.make_input_vec();
    for (slot, value) in input.iter_mut().zip(waveform.amplitude.iter()) {
        *slot = *value;
    }
    let mut output = r2c.make_output_vec();
    r2c.process(&mut input, &mut output)
        .map_err(|e| InversionError::Fft(e.to_string()))?;
    Ok(output)
}

/// Complex index from the transfer function after removing `correction` (Fresnel and echo factors).
///
/// `phase` is the unwrapped phase of the uncorrected transfer function; the phase of the correction is
/// small and subtracted as a principal value.
fn solve_exponent(h: Complex64, phase: f64, correction: Complex64, k0d: f64) -> Complex64 {
    let propagation = h / correction;
    let phase = phase - correction.arg();
    let n = 1.0 - phase / k0d;
    let kappa = -propagation.norm().ln() / k0d;
    Complex64::new(n, -kappa)
}

/// Fresnel transmission in and out of the slab times the Fabry–Pérot echo sum.
fn slab_factor(index: Complex64, k0d: f64) -> Complex64 {
    let one = Complex64::new(1.0, 0.0);
    let fresnel = 4.0 * index / ((index + one) * (index + one));
    let rho = (index - one) / (index + one);
    let round_trip = (-2.0 * Complex64::i() * index * k0d).exp();
    fresnel / (one - rho * rho * round_trip)
}

/// Inverts the slab model for the given waveform pair.
pub fn invert_with(
    sample: &Waveform,
    reference: &Waveform,
    thickness_mm: f64,
    settings: &InversionSettings,
) -> Result<InversionOutput, InversionError> {
    let dt = validate(sample, reference, thickness_mm, settings)?;

    let n_fft = settings.upsampling as usize * sample.len().max(reference.len());
    let mut planner = RealFftPlanner::<f64>::new();
    let sample_spectrum = spectrum(&mut planner, sample, n_fft)?;
    let reference_spectrum = spectrum(&mut planner, reference, n_fft)?;
    let df = 1.0 / (n_fft as f64 * dt);

    // DC carries no phase information and is always excluded
    let bins: Vec<usize> = (1..reference_spectrum.len())
        .filter(|k| {
            let f = *k as f64 * df;
            f >= settings.freq_min && f <= settings.freq_max
        })
        .collect();
    if bins.is_empty() {
        return Err(InversionError::EmptyBand {
            min: settings.freq_min,
            max: settings.freq_max,
        });
    }
    log::debug!(
        "inverting {} bins between {} and {} THz (df = {df} THz, {n_fft} point FFT)",
        bins.len(),
        bins[0] as f64 * df,
        bins[bins.len() - 1] as f64 * df
    );

    let offset = sample.time[0] - reference.time[0];
    let frequency: Vec<f64> = bins.iter().map(|k| *k as f64 * df).collect();
    let mut transfer = Vec::with_capacity(bins.len());
    for (k, f) in bins.iter().zip(frequency.iter()) {
        let r = reference_spectrum[*k];
        if r.norm() == 0.0 {
            return Err(InversionError::SingularTransferFunction { frequency: *f });
        }
        let shift = Complex64::from_polar(1.0, -2.0 * PI * f * offset);
        let h = sample_spectrum[*k] / r * shift;
        if !h.is_finite() || h.norm() == 0.0 {
            return Err(InversionError::SingularTransferFunction { frequency: *f });
        }
        transfer.push(h);
    }

    let wrapped: Vec<f64> = transfer.iter().map(|h| h.arg()).collect();
    let mut phase = unwrap_phase(&wrapped, 2.0 * PI);
    // the unwrapped phase of a physical slab extrapolates to 0 at DC
    if let Some((intercept, _)) = linear_fit(&frequency, &phase) {
        let jump = 2.0 * PI * (intercept / (2.0 * PI)).round();
        if jump != 0.0 {
            log::debug!("removing a phase offset of {jump} rad");
            phase.iter_mut().for_each(|p| *p -= jump);
        }
    }

    // ω d / c for every bin
    let k0d: Vec<f64> = frequency
        .iter()
        .map(|f| 2.0 * PI * f * thickness_mm / SPEED_OF_LIGHT_MM_PER_PS)
        .collect();

    let mut index: Vec<Complex64> = transfer
        .iter()
        .zip(phase.iter())
        .zip(k0d.iter())
        .map(|((h, p), k)| {
            let n = 1.0 - p / k;
            let fresnel = 4.0 * n / ((n + 1.0) * (n + 1.0));
            solve_exponent(*h, *p, Complex64::new(fresnel, 0.0), *k)
        })
        .collect();

    for iteration in 0..settings.fabry_perot_iterations {
        let mut max_change: f64 = 0.0;
        for ((current, h), (p, k)) in index
            .iter_mut()
            .zip(transfer.iter())
            .zip(phase.iter().zip(k0d.iter()))
        {
            let next = solve_exponent(*h, *p, slab_factor(*current, *k), *k);
            max_change = max_change.max((next - *current).norm());
            *current = next;
        }
        if max_change.is_nan() {
            log::warn!(
                "Fabry–Pérot refinement produced NaN in iteration {}, stopping",
                iteration + 1
            );
            break;
        }
        if max_change < FABRY_PEROT_TOLERANCE {
            log::debug!("Fabry–Pérot refinement converged after {} iterations", iteration + 1);
            break;
        }
        if iteration + 1 == settings.fabry_perot_iterations {
            log::warn!(
                "Fabry–Pérot refinement did not converge within {} iterations (last change {max_change:e})",
                settings.fabry_perot_iterations
            );
        }
    }

    let mut refractive_index = Vec::with_capacity(index.len());
    let mut absorption_coefficient = Vec::with_capacity(index.len());
    for ((value, f), k) in index.iter().zip(frequency.iter()).zip(k0d.iter()) {
        let n = value.re;
        // α = 2ωκ/c = 2κ · (ωd/c) / d
        let alpha = 2.0 * (-value.im) * k / thickness_mm;
        if !n.is_finite() || !alpha.is_finite() {
            return Err(InversionError::SingularTransferFunction { frequency: *f });
        }
        refractive_index.push(n);
        absorption_coefficient.push(alpha);
    }

    Ok(InversionOutput {
        frequency,
        refractive_index,
        absorption_coefficient,
    })
}
