//! Randomized perturbation parameters.
//!
//! Parameters are drawn fresh for every job from a [`ParamSource`]. The
//! source wraps a seedable RNG so tests can replay exact sequences.

use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rotation magnitudes in degrees. Zero is excluded so every output differs
/// from its source at pixel level.
pub const ROTATION_CHOICES_DEG: [f64; 4] = [-0.3, -0.2, 0.2, 0.3];
/// Per-pixel noise intensity.
pub const NOISE_RANGE: RangeInclusive<f64> = 1.0..=2.0;
/// Pixels trimmed from width and height to hide the rotation fill border.
pub const CROP_MARGIN_PX: u32 = 2;

/// Symmetric relative jitter applied to the probed bitrate.
pub const BITRATE_JITTER: f64 = 0.05;
/// Floor for the computed target bitrate in bits/second.
pub const MIN_TARGET_BITRATE: u64 = 300_000;
/// Symmetric relative jitter for playback speed.
pub const SPEED_JITTER: f64 = 0.02;
/// Allowed playback speed band.
pub const SPEED_BAND: RangeInclusive<f64> = 0.98..=1.02;
/// Symmetric relative jitter for gamma.
pub const GAMMA_JITTER: f64 = 0.01;

/// Parameters for one image transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageParams {
    /// Rotation in degrees, one of [`ROTATION_CHOICES_DEG`]
    pub rotation_deg: f64,
    /// Noise intensity within [`NOISE_RANGE`]
    pub noise_level: f64,
}

impl ImageParams {
    pub fn draw<R: Rng>(rng: &mut R) -> Self {
        let idx = rng.random_range(0..ROTATION_CHOICES_DEG.len());
        Self {
            rotation_deg: ROTATION_CHOICES_DEG[idx],
            noise_level: rng.random_range(NOISE_RANGE),
        }
    }

    /// Filter chain: rotate, then crop the fill border, then add noise.
    pub fn filters(&self) -> Vec<String> {
        vec![
            format!("rotate={}*PI/180:fillcolor=white@0", self.rotation_deg),
            format!("crop=iw-{m}:ih-{m}", m = CROP_MARGIN_PX),
            format!("noise=alls={:.2}:allf=t", self.noise_level),
        ]
    }
}

/// Parameters for one video transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoParams {
    /// Relative bitrate change in `[-BITRATE_JITTER, BITRATE_JITTER]`
    pub bitrate_delta: f64,
    /// Playback speed multiplier within [`SPEED_BAND`]
    pub speed_factor: f64,
    /// Gamma multiplier around 1.0
    pub gamma_shift: f64,
}

impl VideoParams {
    pub fn draw<R: Rng>(rng: &mut R) -> Self {
        let bitrate_delta = rng.random_range(-BITRATE_JITTER..=BITRATE_JITTER);
        let speed_delta = rng.random_range(-SPEED_JITTER..=SPEED_JITTER);
        let gamma_delta = rng.random_range(-GAMMA_JITTER..=GAMMA_JITTER);

        Self {
            bitrate_delta,
            speed_factor: (1.0 + speed_delta).clamp(*SPEED_BAND.start(), *SPEED_BAND.end()),
            gamma_shift: 1.0 + gamma_delta,
        }
    }

    /// Jittered target bitrate, never below [`MIN_TARGET_BITRATE`].
    pub fn target_bitrate(&self, base_bitrate: u64) -> u64 {
        let jittered = (base_bitrate as f64 * (1.0 + self.bitrate_delta)) as u64;
        jittered.max(MIN_TARGET_BITRATE)
    }

    /// Filter chain: retime by the inverse speed factor, then shift gamma.
    pub fn filters(&self) -> Vec<String> {
        vec![
            format!("setpts={:.5}*PTS", 1.0 / self.speed_factor),
            format!("eq=gamma={:.4}", self.gamma_shift),
        ]
    }

    /// Audio retime keeping sound in sync with the video speed.
    pub fn audio_filter(&self) -> String {
        format!("atempo={:.4}", self.speed_factor)
    }
}

/// Shared random source for transform parameters.
#[derive(Debug)]
pub struct ParamSource {
    rng: Mutex<StdRng>,
}

impl Default for ParamSource {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl ParamSource {
    /// Seed from the operating system.
    pub fn from_os_rng() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic source, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self { rng: Mutex::new(rng) }
    }

    pub fn image_params(&self) -> ImageParams {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        ImageParams::draw(&mut *rng)
    }

    pub fn video_params(&self) -> VideoParams {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        VideoParams::draw(&mut *rng)
    }
}
