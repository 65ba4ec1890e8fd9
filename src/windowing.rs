//! Shared, peak-aligned windowing of a sample/reference pair.
//!
//! Both waveforms are cut around the same absolute time (the dominant peak of the pair) with the same
//! half-width and taper, which keeps their relative time alignment intact for the transfer function.

use crate::data_container::{AppliedWindow, Waveform};
use crate::error::WindowError;
use crate::math_tools::{nearest_index, window_weight, WindowKind};
use ndarray::{s, Array1};

/// Time of the largest absolute amplitude over all given waveforms.
fn common_peak_time(waveforms: &[Waveform]) -> Option<f64> {
    waveforms
        .iter()
        .filter_map(|w| w.peak().map(|(i, t)| (w.amplitude[i].abs(), t)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, t)| t)
}

/// Truncates `waveform` to `center ± half_width` samples and applies the taper.
///
/// The centre must lie within the time span of the waveform, otherwise the window would sit on an
/// edge sample and cut the pulse away.
fn window_one(waveform: &Waveform, window: AppliedWindow) -> Result<Waveform, WindowError> {
    let (first, last) = (waveform.time[0], waveform.time[waveform.len() - 1]);
    let (start, end) = (first.min(last), first.max(last));
    if !(start..=end).contains(&window.center_time) {
        return Err(WindowError::CentreOutsideWaveform {
            center_time: window.center_time,
            start,
            end,
        });
    }
    // the pair may have slightly different time axes, so every waveform gets its own centre index
    let center =
        nearest_index(waveform.time.view(), window.center_time).ok_or(WindowError::EmptyWaveform)?;
    let lower = center.saturating_sub(window.half_width);
    let upper = center
        .saturating_add(window.half_width)
        .min(waveform.len() - 1);

    let time = waveform.time.slice(s![lower..=upper]).to_owned();
    let weights = Array1::from_iter((lower..=upper).map(|i| {
        window_weight(
            window.kind,
            i as f64 - center as f64,
            window.half_width as f64,
        )
    }));
    let amplitude = &waveform.amplitude.slice(s![lower..=upper]) * &weights;

    Ok(Waveform {
        time,
        amplitude,
        window: Some(window),
    })
}

/// Applies the same window to both waveforms of the pair.
///
/// The window is centred on the dominant peak of the pair, reaches zero `half_width` samples away
/// from it, and the waveforms are truncated to that support. A pair that already carries exactly
/// this window is returned unchanged. Both waveforms must cover the centre.
pub fn apply_common_window(
    waveforms: [Waveform; 2],
    half_width: usize,
    kind: WindowKind,
) -> Result<[Waveform; 2], WindowError> {
    if half_width == 0 {
        return Err(WindowError::ZeroHalfWidth);
    }
    if waveforms.iter().any(|w| w.is_empty()) {
        return Err(WindowError::EmptyWaveform);
    }
    let center_time = common_peak_time(&waveforms).ok_or(WindowError::EmptyWaveform)?;
    let window = AppliedWindow {
        kind,
        half_width,
        center_time,
    };

    if waveforms.iter().all(|w| w.window == Some(window)) {
        log::debug!("pair already carries the {kind} window, skipping");
        return Ok(waveforms);
    }

    log::debug!(
        "applying {kind} window with half-width {half_width} samples around t = {center_time}"
    );
    let [first, second] = &waveforms;
    Ok([window_one(first, window)?, window_one(second, window)?])
}
