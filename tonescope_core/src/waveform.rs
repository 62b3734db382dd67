use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Periodic function selected for the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Cycle order used by `advance_waveform`.
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    /// The waveform that follows `self` in the fixed cycle, wrapping back to sine.
    pub fn next(self) -> Self {
        match self {
            Waveform::Sine => Waveform::Square,
            Waveform::Square => Waveform::Sawtooth,
            Waveform::Sawtooth => Waveform::Triangle,
            Waveform::Triangle => Waveform::Sine,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "Sine",
            Waveform::Square => "Square",
            Waveform::Sawtooth => "Sawtooth",
            Waveform::Triangle => "Triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `cos(x) / sin(x)`; infinite or NaN where `sin(x)` is zero.
#[inline]
fn cot(x: f64) -> f64 {
    x.cos() / x.sin()
}

/// Maps a time value (seconds) to a signal amplitude.
///
/// Frequency and amplitude are integers, phase is in radians. The derived
/// constants (period, angular frequency, 2A, A/2) are recomputed by every
/// setter that touches frequency or amplitude, so `sample` always sees a
/// consistent set.
///
/// The angular constant is `(π/2)·f`, not `2π·f`: a sine of frequency `f`
/// repeats every `4/f` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformGenerator {
    frequency: i32,
    amplitude: i32,
    phase: f64,
    waveform: Waveform,

    // Derived from frequency / amplitude
    period: f64,
    angular_frequency: f64,
    twice_amplitude: i32,
    half_amplitude: f64,
}

impl WaveformGenerator {
    pub fn new(frequency: i32, amplitude: i32, waveform: Waveform, phase: f64) -> Self {
        let mut generator = Self {
            frequency,
            amplitude,
            phase,
            waveform,
            period: 0.0,
            angular_frequency: 0.0,
            twice_amplitude: 0,
            half_amplitude: 0.0,
        };
        generator.rederive();
        generator
    }

    /// Recompute the constants that depend on frequency and amplitude.
    fn rederive(&mut self) {
        self.twice_amplitude = self.amplitude.saturating_mul(2);
        self.half_amplitude = f64::from(self.amplitude) / 2.0;
        self.period = 1.0 / f64::from(self.frequency);
        self.angular_frequency = FRAC_PI_2 * f64::from(self.frequency);
    }

    /// Signal value at time `t` (seconds) for the current parameters.
    ///
    /// The sawtooth divides by `sin(πt/period)`; at its zero crossings the
    /// result follows IEEE-754 (`±A` through `atan(±inf)`, or NaN) instead of
    /// being corrected.
    #[inline]
    pub fn sample(&self, t: f64) -> f64 {
        let amplitude = f64::from(self.amplitude);
        match self.waveform {
            Waveform::Sine => amplitude * (self.angular_frequency * t + self.phase).sin(),
            Waveform::Square => {
                if (self.angular_frequency * t + self.phase).sin() >= 0.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            Waveform::Sawtooth => {
                let value = (PI * t) / self.period;
                -(f64::from(self.twice_amplitude) / PI) * cot(value).atan()
            }
            Waveform::Triangle => {
                let value = (FRAC_PI_2 * t) / self.period;
                (f64::from(self.twice_amplitude) / PI) * value.sin().asin()
            }
        }
    }

    // Setters

    pub fn set_frequency(&mut self, frequency: i32) {
        self.frequency = frequency;
        self.rederive();
    }

    pub fn set_amplitude(&mut self, amplitude: i32) {
        self.amplitude = amplitude;
        self.rederive();
    }

    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase;
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Shift the frequency by `delta` Hz.
    pub fn change_frequency(&mut self, delta: i32) {
        self.set_frequency(self.frequency.saturating_add(delta));
    }

    /// Shift the amplitude by `delta` units.
    pub fn change_amplitude(&mut self, delta: i32) {
        self.set_amplitude(self.amplitude.saturating_add(delta));
    }

    /// Step to the next waveform in the cycle and return it.
    ///
    /// Only the shape changes here; the caller owns resetting play position
    /// and clearing any display history.
    pub fn advance_waveform(&mut self) -> Waveform {
        self.waveform = self.waveform.next();
        self.waveform
    }

    // Getters

    pub fn frequency(&self) -> i32 {
        self.frequency
    }

    pub fn amplitude(&self) -> i32 {
        self.amplitude
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn angular_frequency(&self) -> f64 {
        self.angular_frequency
    }

    pub fn twice_amplitude(&self) -> i32 {
        self.twice_amplitude
    }

    pub fn half_amplitude(&self) -> f64 {
        self.half_amplitude
    }

    /// Dump the generator state through the logger.
    pub fn log_state(&self, prefix: &str) {
        log::info!("{prefix}WaveformGenerator:");
        log::info!(
            "{prefix}    frequency {} Hz, angular frequency {:.6}",
            self.frequency,
            self.angular_frequency
        );
        log::info!(
            "{prefix}    amplitude {}, 2A {}, A/2 {}",
            self.amplitude,
            self.twice_amplitude,
            self.half_amplitude
        );
        log::info!("{prefix}    period {:.6} s, phase {}", self.period, self.phase);
        log::info!("{prefix}    waveform {}", self.waveform);
    }
}

impl Default for WaveformGenerator {
    fn default() -> Self {
        Self::new(440, 120, Waveform::Sine, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn sweep(step: f64, count: usize) -> impl Iterator<Item = f64> {
        (0..count).map(move |i| i as f64 * step)
    }

    #[test]
    fn test_derived_values_follow_setters() {
        let mut wave = WaveformGenerator::new(440, 120, Waveform::Sine, 0.0);
        assert_eq!(wave.twice_amplitude(), 240);
        assert!((wave.half_amplitude() - 60.0).abs() < EPS);
        assert!((wave.period() - 1.0 / 440.0).abs() < 1e-12);
        assert!((wave.angular_frequency() - FRAC_PI_2 * 440.0).abs() < 1e-9);

        wave.set_frequency(100);
        wave.set_amplitude(7);
        assert!((wave.period() - 0.01).abs() < 1e-12);
        assert!((wave.angular_frequency() - FRAC_PI_2 * 100.0).abs() < 1e-9);
        assert_eq!(wave.twice_amplitude(), 14);
        assert!((wave.half_amplitude() - 3.5).abs() < EPS);

        wave.change_frequency(-1);
        wave.change_amplitude(1);
        assert_eq!(wave.frequency(), 99);
        assert_eq!(wave.amplitude(), 8);
        assert!((wave.period() - 1.0 / 99.0).abs() < 1e-12);
        assert_eq!(wave.twice_amplitude(), 16);
    }

    #[test]
    fn test_sine_periodic_over_four_over_f() {
        for &(f, a, phase) in &[(440, 120, 0.0), (1, 5, 0.3), (37, 1000, -1.2), (8000, 64, 3.0)] {
            let wave = WaveformGenerator::new(f, a, Waveform::Sine, phase);
            let period = 4.0 / f64::from(f);
            for t in sweep(0.000_37, 500) {
                let tolerance = 1e-9 * f64::from(a).max(1.0) * (1.0 + t * f64::from(f));
                assert!(
                    (wave.sample(t) - wave.sample(t + period)).abs() < tolerance.max(1e-6),
                    "f={f} t={t}"
                );
            }
        }
    }

    #[test]
    fn test_sine_starts_at_phase() {
        let wave = WaveformGenerator::new(440, 120, Waveform::Sine, 0.5);
        assert!((wave.sample(0.0) - 120.0 * 0.5f64.sin()).abs() < EPS);
    }

    #[test]
    fn test_square_is_always_plus_or_minus_amplitude() {
        let wave = WaveformGenerator::new(440, 120, Waveform::Square, 0.25);
        for t in sweep(1.0 / 44_100.0, 10_000) {
            let y = wave.sample(t);
            assert!(y == 120.0 || y == -120.0, "t={t} y={y}");
        }
    }

    #[test]
    fn test_square_tie_resolves_high() {
        // sin(0) == 0 exactly
        let wave = WaveformGenerator::new(440, 50, Waveform::Square, 0.0);
        assert_eq!(wave.sample(0.0), 50.0);
    }

    #[test]
    fn test_triangle_and_sawtooth_bounded_by_amplitude() {
        for waveform in [Waveform::Triangle, Waveform::Sawtooth] {
            let wave = WaveformGenerator::new(440, 120, waveform, 0.0);
            for t in sweep(1.0 / 96_000.0, 20_000) {
                let y = wave.sample(t);
                if y.is_nan() {
                    continue;
                }
                assert!(y.abs() <= 120.0 + 1e-9, "{waveform} t={t} y={y}");
            }
        }
    }

    #[test]
    fn test_sawtooth_boundary_does_not_panic() {
        // sin(0) == 0, so cot is +inf and atan gives π/2
        let wave = WaveformGenerator::new(440, 120, Waveform::Sawtooth, 0.0);
        let y = wave.sample(0.0);
        assert!((y + 120.0).abs() < 1e-9, "y={y}");
    }

    #[test]
    fn test_triangle_known_points() {
        let wave = WaveformGenerator::new(1, 100, Waveform::Triangle, 0.0);
        // value = (π/2)·t, peak at t = 1
        assert!(wave.sample(0.0).abs() < EPS);
        assert!((wave.sample(1.0) - 100.0).abs() < 1e-4);
        assert!((wave.sample(3.0) + 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_advance_waveform_cycle() {
        let mut wave = WaveformGenerator::default();
        let seen: Vec<Waveform> = (0..5).map(|_| wave.advance_waveform()).collect();
        assert_eq!(
            seen,
            vec![
                Waveform::Square,
                Waveform::Sawtooth,
                Waveform::Triangle,
                Waveform::Sine,
                Waveform::Square
            ]
        );
    }

    #[test]
    fn test_zero_frequency_is_finite_for_triangle() {
        let wave = WaveformGenerator::new(0, 10, Waveform::Triangle, 0.0);
        assert!(wave.period().is_infinite());
        assert_eq!(wave.sample(0.5), 0.0);
    }
}
