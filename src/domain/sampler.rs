//! Parameter suggestion strategies.
//!
//! A sampler proposes values for the ranged parameters of a search space,
//! conditioning on every completed trial so far.

use crate::domain::objective::StudyDirection;
use crate::domain::param_space::{ParamAssignment, ParamSpec, ParamValue, SearchSpace};
use crate::domain::study::Trial;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::OptitraderError;

pub trait Sampler: Send {
    /// Suggest values for every ranged parameter in `space`.
    fn suggest(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: StudyDirection,
    ) -> ParamAssignment;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Tpe,
    Random,
}

impl FromStr for SamplerKind {
    type Err = OptitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tpe" => Ok(SamplerKind::Tpe),
            "random" => Ok(SamplerKind::Random),
            other => Err(OptitraderError::ConfigInvalid {
                section: "engine".into(),
                key: "sampler".into(),
                reason: format!("unknown sampler '{other}', expected 'tpe' or 'random'"),
            }),
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerKind::Tpe => f.write_str("tpe"),
            SamplerKind::Random => f.write_str("random"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TpeConfig {
    pub n_startup_trials: usize,
    pub gamma: f64,
    pub n_candidates: usize,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }
}

/// Build a boxed sampler of the given kind.
pub fn build_sampler(kind: SamplerKind, config: TpeConfig, seed: u64) -> Box<dyn Sampler> {
    match kind {
        SamplerKind::Tpe => Box::new(TpeSampler::new(config, seed)),
        SamplerKind::Random => Box::new(RandomSampler::new(seed)),
    }
}

fn sample_uniform(spec: &ParamSpec, rng: &mut StdRng) -> ParamValue {
    match spec {
        ParamSpec::Fixed(v) => *v,
        _ => match spec.grid_steps() {
            Some(steps) => spec.grid_point(rng.gen_range(0..=steps)),
            None => {
                let (low, high) = (spec.low(), spec.high());
                if high > low {
                    spec.snap(rng.gen_range(low..=high))
                } else {
                    spec.snap(low)
                }
            }
        },
    }
}

pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn suggest(
        &mut self,
        space: &SearchSpace,
        _history: &[Trial],
        _direction: StudyDirection,
    ) -> ParamAssignment {
        space
            .ranged()
            .map(|(name, spec)| (name.clone(), sample_uniform(spec, &mut self.rng)))
            .collect()
    }
}

/// Tree-structured Parzen Estimator.
///
/// After `n_startup_trials` uniform draws, history is ranked by oriented
/// score and split into the best `gamma` fraction l(x) and the rest g(x).
/// Each parameter draws `n_candidates` values from a Gaussian mixture
/// centered on the good observations and keeps the candidate maximizing
/// l(x)/g(x). Both densities include a uniform prior over the range.
pub struct TpeSampler {
    config: TpeConfig,
    rng: StdRng,
}

impl TpeSampler {
    pub fn new(config: TpeConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_numerical(
        &mut self,
        name: &str,
        spec: &ParamSpec,
        good: &[&Trial],
        bad: &[&Trial],
    ) -> ParamValue {
        let (low, high) = (spec.low(), spec.high());
        let width = high - low;
        if width <= 0.0 {
            return spec.snap(low);
        }

        let values = |trials: &[&Trial]| -> Vec<f64> {
            trials
                .iter()
                .filter_map(|t| t.params.get(name))
                .map(|v| v.as_f64())
                .collect()
        };
        let good_vals = values(good);
        let bad_vals = values(bad);
        if good_vals.is_empty() {
            return sample_uniform(spec, &mut self.rng);
        }

        let sigma = 0.1 * width;
        let prior = 1.0 / width;
        let density = |x: f64, obs: &[f64]| -> f64 {
            let kde: f64 = obs.iter().map(|&m| gaussian_pdf(x, m, sigma)).sum();
            (kde + prior) / (obs.len() as f64 + 1.0)
        };

        let mut best: Option<(f64, ParamValue)> = None;
        for _ in 0..self.config.n_candidates.max(1) {
            let base = good_vals[self.rng.gen_range(0..good_vals.len())];
            let raw = match Normal::new(base, sigma) {
                Ok(normal) => normal.sample(&mut self.rng),
                Err(_) => self.rng.gen_range(low..=high),
            };
            let candidate = spec.snap(raw);
            let x = candidate.as_f64();
            let ratio = density(x, &good_vals) / (density(x, &bad_vals) + 1e-12);
            if best.as_ref().is_none_or(|(r, _)| ratio > *r) {
                best = Some((ratio, candidate));
            }
        }

        best.map_or_else(|| sample_uniform(spec, &mut self.rng), |(_, v)| v)
    }
}

impl Sampler for TpeSampler {
    fn suggest(
        &mut self,
        space: &SearchSpace,
        history: &[Trial],
        direction: StudyDirection,
    ) -> ParamAssignment {
        if history.len() < self.config.n_startup_trials.max(1) {
            return space
                .ranged()
                .map(|(name, spec)| (name.clone(), sample_uniform(spec, &mut self.rng)))
                .collect();
        }

        let mut ranked: Vec<&Trial> = history.iter().collect();
        ranked.sort_by(|a, b| {
            direction
                .oriented(b.value)
                .total_cmp(&direction.oriented(a.value))
        });
        let n_good = ((history.len() as f64 * self.config.gamma).ceil() as usize)
            .clamp(1, history.len());
        let (good, bad) = ranked.split_at(n_good);

        let mut suggested = ParamAssignment::new();
        for (name, spec) in space.ranged() {
            let value = self.sample_numerical(name, spec, good, bad);
            suggested.insert(name.clone(), value);
        }
        suggested
    }
}

fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let exponent = -0.5 * ((x - mean) / sigma).powi(2);
    (1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt())) * exponent.exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::study::TrialState;
    use proptest::prelude::*;
    use serde_json::json;

    fn space_with(name: &str, value: serde_json::Value) -> SearchSpace {
        let mut space = SearchSpace::new();
        space
            .insert(name, ParamSpec::from_json(name, &value).unwrap())
            .unwrap();
        space
    }

    fn trial(number: usize, name: &str, value: ParamValue, score: f64) -> Trial {
        let mut params = ParamAssignment::new();
        params.insert(name.to_string(), value);
        Trial {
            number,
            params,
            value: score,
            raw_value: score,
            state: TrialState::Complete,
            evaluation: None,
        }
    }

    #[test]
    fn integer_range_yields_integers_in_bounds() {
        let space = space_with("w", json!([10, 20]));
        let mut sampler = RandomSampler::new(1);
        for _ in 0..200 {
            let s = sampler.suggest(&space, &[], StudyDirection::Maximize);
            match s["w"] {
                ParamValue::Int(v) => assert!((10..=20).contains(&v)),
                other => panic!("expected int, got {other:?}"),
            }
        }
    }

    #[test]
    fn float_range_yields_floats() {
        let space = space_with("x", json!([10.0, 20.0]));
        let mut sampler = RandomSampler::new(2);
        let s = sampler.suggest(&space, &[], StudyDirection::Maximize);
        match s["x"] {
            ParamValue::Float(v) => assert!((10.0..=20.0).contains(&v)),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn stepped_range_stays_on_grid() {
        let space = space_with("x", json!([0, 1, 0.25]));
        let grid = [0.0, 0.25, 0.5, 0.75, 1.0];
        let mut sampler = RandomSampler::new(3);
        for _ in 0..100 {
            let v = sampler.suggest(&space, &[], StudyDirection::Maximize)["x"].as_f64();
            assert!(grid.iter().any(|g| (g - v).abs() < 1e-12), "{v} off grid");
        }
    }

    #[test]
    fn fixed_params_are_not_suggested() {
        let mut space = space_with("w", json!([10, 20]));
        space
            .insert("fee", ParamSpec::from_json("fee", &json!(0.001)).unwrap())
            .unwrap();
        let s = RandomSampler::new(4).suggest(&space, &[], StudyDirection::Maximize);
        assert!(s.contains_key("w"));
        assert!(!s.contains_key("fee"));
    }

    #[test]
    fn same_seed_same_suggestions() {
        let space = space_with("w", json!([1, 1000]));
        let mut a = TpeSampler::new(TpeConfig::default(), 42);
        let mut b = TpeSampler::new(TpeConfig::default(), 42);
        for _ in 0..5 {
            assert_eq!(
                a.suggest(&space, &[], StudyDirection::Maximize),
                b.suggest(&space, &[], StudyDirection::Maximize)
            );
        }
    }

    #[test]
    fn tpe_concentrates_near_good_region() {
        let space = space_with("x", json!([0.0, 100.0]));
        // Score peaks at x = 80.
        let history: Vec<Trial> = (0..40)
            .map(|i| {
                let x = i as f64 * 2.5;
                trial(i, "x", ParamValue::Float(x), -(x - 80.0).abs())
            })
            .collect();
        let mut sampler = TpeSampler::new(TpeConfig::default(), 7);
        let mean: f64 = (0..50)
            .map(|_| sampler.suggest(&space, &history, StudyDirection::Maximize)["x"].as_f64())
            .sum::<f64>()
            / 50.0;
        assert!((mean - 80.0).abs() < 15.0, "mean suggestion {mean}");
    }

    #[test]
    fn tpe_respects_minimize_direction() {
        let space = space_with("x", json!([0.0, 100.0]));
        // Lower is better, minimum at x = 20.
        let history: Vec<Trial> = (0..40)
            .map(|i| {
                let x = i as f64 * 2.5;
                trial(i, "x", ParamValue::Float(x), (x - 20.0).abs())
            })
            .collect();
        let mut sampler = TpeSampler::new(TpeConfig::default(), 11);
        let mean: f64 = (0..50)
            .map(|_| sampler.suggest(&space, &history, StudyDirection::Minimize)["x"].as_f64())
            .sum::<f64>()
            / 50.0;
        assert!((mean - 20.0).abs() < 15.0, "mean suggestion {mean}");
    }

    #[test]
    fn sampler_kind_parses() {
        assert_eq!("TPE".parse::<SamplerKind>().unwrap(), SamplerKind::Tpe);
        assert_eq!("random".parse::<SamplerKind>().unwrap(), SamplerKind::Random);
        assert!("grid".parse::<SamplerKind>().is_err());
    }

    proptest! {
        #[test]
        fn tpe_suggestions_stay_in_range(
            seed in 0u64..1000,
            scores in prop::collection::vec(-10.0f64..10.0, 12..30),
        ) {
            let space = space_with("w", json!([10, 20]));
            let history: Vec<Trial> = scores
                .iter()
                .enumerate()
                .map(|(i, &s)| trial(i, "w", ParamValue::Int(10 + (i as i64 % 11)), s))
                .collect();
            let mut sampler = TpeSampler::new(TpeConfig::default(), seed);
            let s = sampler.suggest(&space, &history, StudyDirection::Maximize);
            match s["w"] {
                ParamValue::Int(v) => prop_assert!((10..=20).contains(&v)),
                other => prop_assert!(false, "expected int, got {:?}", other),
            }
        }
    }
}
