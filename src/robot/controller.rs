//! Coupled oscillator controllers attached to every module.
//!
//! Each module drives its joint with `amp * sin(freq * t + phase) + offset`,
//! where `phase` is the parent's phase plus the module's own phase offset.
//! Evolution only touches the parameters; the runtime state exists so an
//! external runtime (or a test) can step the oscillators.

use crate::schema::{ControllerConfig, ControllerParams};

use super::GenomeRng;

/// Oscillator parameters plus runtime state.
#[derive(Debug, Clone, PartialEq)]
pub struct Oscillator {
    params: ControllerParams,
    time_state: f32,
    phase_state: f32,
}

impl Oscillator {
    /// Oscillator with freshly drawn parameters.
    pub fn random(config: &ControllerConfig, rng: &mut GenomeRng) -> Self {
        Self::from_params(ControllerParams {
            amplitude: rng.uniform(config.initial_amplitude_bounds),
            phase_offset: rng.uniform(config.phase_offset_bounds),
            offset: rng.uniform(config.offset_bounds),
            frequency: config.frequency,
        })
    }

    /// Oscillator copying a parent's parameters.
    pub fn inherit(parent: &Oscillator) -> Self {
        Self::from_params(parent.params)
    }

    /// Oscillator with the given parameters and a zeroed state.
    pub fn from_params(params: ControllerParams) -> Self {
        Self {
            params,
            time_state: 0.0,
            phase_state: 0.0,
        }
    }

    /// Current parameters.
    pub fn params(&self) -> ControllerParams {
        self.params
    }

    /// Phase reached by the last update.
    pub fn phase_state(&self) -> f32 {
        self.phase_state
    }

    /// Perturb amplitude, phase offset and offset, each with probability
    /// `config.mutation_rate`. Phase wraps around its range, the others clamp.
    pub fn mutate(&mut self, config: &ControllerConfig, rng: &mut GenomeRng) {
        if rng.chance(config.mutation_rate) {
            self.params.amplitude = rng.gaussian_mutate(
                self.params.amplitude,
                config.mutation_sigma,
                config.amplitude_bounds,
            );
        }
        if rng.chance(config.mutation_rate) {
            let (low, high) = config.phase_offset_bounds;
            let sigma = config.mutation_sigma * (high - low);
            let phase = rng.gaussian(self.params.phase_offset, sigma);
            self.params.phase_offset = wrap(phase, config.phase_offset_bounds);
        }
        if rng.chance(config.mutation_rate) {
            self.params.offset = rng.gaussian_mutate(
                self.params.offset,
                config.mutation_sigma,
                config.offset_bounds,
            );
        }
    }

    /// Advance by `delta_time` and return the clamped joint target.
    pub fn update(
        &mut self,
        delta_time: f32,
        parent_phase: Option<f32>,
        output_bounds: (f32, f32),
    ) -> f32 {
        self.time_state += delta_time;
        if let Some(parent_phase) = parent_phase {
            self.phase_state = parent_phase + self.params.phase_offset;
        }
        let out = self.params.amplitude
            * (self.params.frequency * self.time_state + self.phase_state).sin()
            + self.params.offset;
        out.clamp(output_bounds.0, output_bounds.1)
    }

    /// Zero the runtime state.
    pub fn reset(&mut self) {
        self.time_state = 0.0;
        self.phase_state = 0.0;
    }
}

/// Wrap a value into a circular range.
fn wrap(value: f32, bounds: (f32, f32)) -> f32 {
    let span = bounds.1 - bounds.0;
    if span <= 0.0 {
        return bounds.0;
    }
    if (bounds.0..=bounds.1).contains(&value) {
        value
    } else {
        bounds.0 + (value - bounds.0).rem_euclid(span)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    #[test]
    fn test_wrap() {
        assert!((wrap(PI + 0.5, (-PI, PI)) - (-PI + 0.5)).abs() < 1e-5);
        assert!((wrap(-PI - 0.25, (-PI, PI)) - (PI - 0.25)).abs() < 1e-5);
        assert_eq!(wrap(0.3, (-PI, PI)), 0.3);
    }

    #[test]
    fn test_random_within_bounds() {
        let config = ControllerConfig::default();
        let mut rng = GenomeRng::new(42);
        for _ in 0..100 {
            let osc = Oscillator::random(&config, &mut rng);
            let p = osc.params();
            assert!((0.5..=2.0).contains(&p.amplitude));
            assert!((-PI..=PI).contains(&p.phase_offset));
            assert!((-1.0..=1.0).contains(&p.offset));
        }
    }

    #[test]
    fn test_mutation_stays_in_range() {
        let config = ControllerConfig {
            mutation_rate: 1.0,
            mutation_sigma: 2.0,
            ..Default::default()
        };
        let mut rng = GenomeRng::new(9);
        let mut osc = Oscillator::random(&config, &mut rng);
        for _ in 0..500 {
            osc.mutate(&config, &mut rng);
            let p = osc.params();
            assert!((0.0..=2.0).contains(&p.amplitude));
            assert!((-PI..=PI).contains(&p.phase_offset));
            assert!((-1.0..=1.0).contains(&p.offset));
        }
    }

    #[test]
    fn test_update_clamps_and_resets() {
        let mut osc = Oscillator::from_params(ControllerParams {
            amplitude: 2.0,
            phase_offset: 0.5,
            offset: 1.0,
            frequency: 4.0,
        });
        for _ in 0..20 {
            let out = osc.update(0.05, Some(0.0), (-1.0, 1.0));
            assert!((-1.0..=1.0).contains(&out));
        }
        assert_eq!(osc.phase_state(), 0.5);
        osc.reset();
        assert_eq!(osc.phase_state(), 0.0);
    }
}
