//! This module provides the windowing functions used before the FFT (Blackman, Hanning and an adapted
//! Blackman window), together with small numeric helpers: phase unwrapping, a least-squares line fit and
//! peak detection.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

/// Enum representing the different taper shapes supported by the windowing stage.
///
/// All variants have a weight of 1 at the window centre, decay smoothly to 0 at the
/// half-width and are 0 outside of it.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum WindowKind {
    /// Adapted Blackman window with only the beginning and ending being altered.
    #[default]
    AdaptedBlackman,
    /// Original Blackman window
    Blackman,
    /// Hanning window
    Hanning,
}

impl Display for WindowKind {
    /// Provides a user-friendly string representation of each window type.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowKind::AdaptedBlackman => {
                write!(f, "Adapted Blackman")
            }
            WindowKind::Blackman => {
                write!(f, "Blackman")
            }
            WindowKind::Hanning => {
                write!(f, "Hanning")
            }
        }
    }
}

/// Fraction of the half-width over which the adapted Blackman window tapers.
const ADAPTED_BLACKMAN_TAPER: f64 = 0.25;

/// Computes the Blackman window value for a given sample.
///
/// The implementation follows the mathematical definition as used by Python's numpy library.
///
/// # Arguments
/// - `n`: The current time or sample index.
/// - `m`: The total length of the signal.
///
/// # Returns
/// The computed value of the Blackman window. It automatically clamps the value in the range [0.0, 1.0].
fn blackman_window(n: f64, m: f64) -> f64 {
    // blackman window as implemented by numpy (python)
    let res = 0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos();
    if res.is_nan() {
        1.0
    } else {
        res.clamp(0.0, 1.0)
    }
}

/// Computes the Hanning window value for a given sample, see [`blackman_window`] for the arguments.
fn hanning_window(n: f64, m: f64) -> f64 {
    (0.5 * (1.0 - (2.0 * PI * n / m).cos())).clamp(0.0, 1.0)
}

/// Returns the window weight at a signed sample `offset` from the window centre.
///
/// # Arguments
/// - `kind`: The taper shape.
/// - `offset`: Distance from the centre in samples, negative before the centre.
/// - `half_width`: Number of samples from the centre to the point where the weight reaches 0.
pub fn window_weight(kind: WindowKind, offset: f64, half_width: f64) -> f64 {
    if half_width <= 0.0 || offset.abs() >= half_width {
        return 0.0;
    }
    match kind {
        WindowKind::Blackman => blackman_window(offset + half_width, 2.0 * half_width),
        WindowKind::Hanning => hanning_window(offset + half_width, 2.0 * half_width),
        WindowKind::AdaptedBlackman => {
            let taper = (ADAPTED_BLACKMAN_TAPER * half_width).max(1.0);
            // distance to the closest edge of the window
            let edge = half_width - offset.abs();
            if edge >= taper {
                1.0
            } else {
                // rising half of a blackman window of width 2 * taper
                blackman_window(edge, 2.0 * taper)
            }
        }
    }
}

/// Unwraps a phase by removing jumps larger than half a period between consecutive values.
///
/// The first value is kept as is, every following value is shifted by a multiple of `period`
/// so that consecutive differences lie within `[-period / 2, period / 2]`.
pub fn unwrap_phase(x: &[f64], period: f64) -> Vec<f64> {
    let mut unwrapped = x.to_owned();
    if x.is_empty() {
        return unwrapped;
    }
    let mut prev_val = x[0];
    let mut prev_unwrapped = x[0];
    for i in 1..x.len() {
        let val = x[i];
        let mut diff = val - prev_val;
        // a single step can contain several periods when the phase is sampled coarsely
        diff -= period * (diff / period).round();
        let unwrapped_val = prev_unwrapped + diff;
        prev_val = val;
        prev_unwrapped = unwrapped_val;
        unwrapped[i] = unwrapped_val;
    }
    unwrapped
}

/// Least-squares fit of `y = intercept + slope * x`.
///
/// Returns `None` for fewer than two points or a degenerate `x`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for (xi, yi) in x[..n].iter().zip(y[..n].iter()) {
        sxx += (xi - mean_x) * (xi - mean_x);
        sxy += (xi - mean_x) * (yi - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

/// Index of the sample with the largest absolute value, `None` for an empty signal.
pub fn peak_index(signal: ArrayView1<f64>) -> Option<usize> {
    signal
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
}

/// Index of the time sample closest to `t`, `None` for an empty axis.
pub fn nearest_index(time: ArrayView1<f64>, t: f64) -> Option<usize> {
    time.iter()
        .enumerate()
        .min_by(|a, b| (a.1 - t).abs().total_cmp(&(b.1 - t).abs()))
        .map(|(i, _)| i)
}
