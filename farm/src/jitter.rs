//! Coordinate conversion and timing randomisation shared by fanout and
//! macro playback.
//!
//! Positions are normalised fractions of the screen in `[0, 1]`; jitter
//! percentages are expressed in percent (`2.0` means ±2 %).

use std::time::Duration;

use rand::Rng;

use crate::device::Resolution;

/// Screen size assumed when a device has not reported its own
pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 1080,
    height: 1920,
};

/// Convert a fraction of `size` to a pixel index, clamped to the last
/// valid pixel.
pub fn pct_to_px(pct: f64, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    let pct = if pct.is_finite() { pct.clamp(0.0, 1.0) } else { 0.0 };
    ((pct * size as f64).round() as u32).min(size - 1)
}

/// Convert a normalised point to pixels on a screen of the given size.
pub fn point_to_px(x: f64, y: f64, resolution: Resolution) -> (u32, u32) {
    (
        pct_to_px(x, resolution.width),
        pct_to_px(y, resolution.height),
    )
}

/// Perturb a normalised coordinate by a signed uniform offset of at most
/// `jitter_pct` percent, clamped to `[0, 1]`.
pub fn jitter_coord<R: Rng + ?Sized>(rng: &mut R, value: f64, jitter_pct: f64) -> f64 {
    let amplitude = jitter_pct.max(0.0) / 100.0;
    let offset = if amplitude > 0.0 {
        rng.random_range(-amplitude..=amplitude)
    } else {
        0.0
    };
    (value + offset).clamp(0.0, 1.0)
}

/// Jitter both coordinates of a normalised point, then convert to pixels.
pub fn jittered_px<R: Rng + ?Sized>(rng: &mut R, x: f64, y: f64, jitter_pct: f64, resolution: Resolution) -> (u32, u32) {
    let x = jitter_coord(rng, x, jitter_pct);
    let y = jitter_coord(rng, y, jitter_pct);
    point_to_px(x, y, resolution)
}

/// Stagger before the `index`-th device acts: `base * index` plus a uniform
/// extra of up to `jitter`.
pub fn stagger_delay<R: Rng + ?Sized>(rng: &mut R, index: usize, base: Duration, jitter: Duration) -> Duration {
    let extra_ms = match jitter.as_millis() as u64 {
        0 => 0,
        max => rng.random_range(0..=max),
    };
    base.saturating_mul(index as u32) + Duration::from_millis(extra_ms)
}

/// Scale a recorded duration for playback at `speed` (2.0 plays twice as fast).
pub fn scale_by_speed(ms: u64, speed: f64) -> Duration {
    millis_f64(ms as f64 / effective_speed(speed))
}

/// Delay before a macro step: the recorded gap scaled by `1/speed`, perturbed
/// by a signed uniform jitter of up to `jitter_pct` percent of itself and
/// floored at zero.
pub fn step_delay<R: Rng + ?Sized>(rng: &mut R, dt_ms: u64, speed: f64, jitter_pct: f64) -> Duration {
    let base = dt_ms as f64 / effective_speed(speed);
    let amplitude = base * jitter_pct.max(0.0) / 100.0;
    let offset = if amplitude > 0.0 {
        rng.random_range(-amplitude..=amplitude)
    } else {
        0.0
    };
    millis_f64((base + offset).max(0.0))
}

fn effective_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

fn millis_f64(ms: f64) -> Duration {
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}
