use std::ops::RangeInclusive;

use anyhow::{Result, bail};

#[derive(Clone, Debug)]
pub struct HypergridSearchConfig {
    pub max_steps: u64,
    pub acceptable_residual: f64,
    pub bounds: Vec<RangeInclusive<f64>>,
    pub resolution: usize,
    /// Feasible starting point; the search never returns anything worse.
    pub init_values: Option<Vec<f64>>,
}

impl HypergridSearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            bail!("at least one step must be specified")
        }
        if self.acceptable_residual < 0.0 {
            bail!("acceptable residual must be non-negative")
        }
        if self.bounds.is_empty() {
            bail!("at least one search dimension must be specified")
        }
        if self.bounds.iter().any(|b| !(b.start() <= b.end())) {
            bail!("search bounds must be ordered")
        }
        const MIN_RESOLUTION: usize = 3;
        if self.resolution < MIN_RESOLUTION {
            bail!("search resolution must be at least {MIN_RESOLUTION}")
        }
        if let Some(init) = &self.init_values
            && init.len() != self.bounds.len()
        {
            bail!("initial point has {} dimensions, expected {}", init.len(), self.bounds.len())
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HypergridSearchOutcome {
    pub steps: u64,
    pub optimal_values: Vec<f64>,
    pub optimal_residual: f64,
}

impl HypergridSearchOutcome {
    pub fn found(&self) -> bool {
        self.optimal_residual.is_finite()
    }
}

/// Derivative-free constrained search: evaluate a regular grid over `bounds`,
/// then shrink the grid around the best feasible point and repeat.
pub fn hypergrid_search(
    config: &HypergridSearchConfig,
    mut constraint_f: impl FnMut(&[f64]) -> bool,
    mut loss_f: impl FnMut(&[f64]) -> f64,
) -> Result<HypergridSearchOutcome> {
    config.validate()?;

    let dims = config.bounds.len();
    let mut optimal_values = vec![0.0; dims];
    let mut optimal_residual = f64::INFINITY;

    if let Some(init) = &config.init_values
        && constraint_f(init)
    {
        let residual = loss_f(init);
        if residual.is_finite() {
            optimal_residual = residual;
            optimal_values.copy_from_slice(init);
            if residual <= config.acceptable_residual {
                return Ok(HypergridSearchOutcome {
                    steps: 0,
                    optimal_values,
                    optimal_residual,
                });
            }
        }
    }

    let mut bounds = config.bounds.clone();
    let mut values = vec![0.0; dims];
    let mut ordinals = vec![0usize; dims];
    let inv_resolution = 1.0 / (config.resolution - 1) as f64;
    let mut steps = 0;

    'outer: while steps < config.max_steps {
        steps += 1;
        ordinals.fill(0);
        loop {
            for (dimension, &ordinal) in ordinals.iter().enumerate() {
                let bound = &bounds[dimension];
                let range = bound.end() - bound.start();
                values[dimension] = bound.start() + ordinal as f64 * range * inv_resolution;
            }
            if constraint_f(&values) {
                let residual = loss_f(&values);
                if residual < optimal_residual {
                    optimal_residual = residual;
                    optimal_values.copy_from_slice(&values);
                    if residual <= config.acceptable_residual {
                        break 'outer;
                    }
                }
            }
            if !advance(&mut ordinals, config.resolution) {
                break;
            }
        }

        if !optimal_residual.is_finite() {
            // Nothing feasible on this grid; a finer grid over the same box is all we can try.
            continue;
        }
        for (dimension, &value) in optimal_values.iter().enumerate() {
            let hard_bound = &config.bounds[dimension];
            let bound = &mut bounds[dimension];
            let new_range = (bound.end() - bound.start()) * 2.0 / config.resolution as f64;
            let new_start = f64::max(*hard_bound.start(), value - new_range / 2.0);
            let new_end = f64::min(new_start + new_range, *hard_bound.end());
            *bound = new_start..=new_end;
        }
    }

    Ok(HypergridSearchOutcome {
        steps,
        optimal_values,
        optimal_residual,
    })
}

/// Odometer-style increment over `[0, cardinality)` per digit.
fn advance(ordinals: &mut [usize], cardinality: usize) -> bool {
    for ordinal in ordinals.iter_mut() {
        *ordinal += 1;
        if *ordinal < cardinality {
            return true;
        }
        *ordinal = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bounds: Vec<RangeInclusive<f64>>) -> HypergridSearchConfig {
        HypergridSearchConfig {
            max_steps: 10,
            acceptable_residual: 1e-9,
            bounds,
            resolution: 5,
            init_values: None,
        }
    }

    #[test]
    fn finds_interior_minimum() {
        let outcome = hypergrid_search(
            &config(vec![-10.0..=10.0, -10.0..=10.0]),
            |_| true,
            |v| (v[0] - 3.3).powi(2) + (v[1] + 1.7).powi(2),
        )
        .unwrap();
        assert!((outcome.optimal_values[0] - 3.3).abs() < 0.05);
        assert!((outcome.optimal_values[1] + 1.7).abs() < 0.05);
    }

    #[test]
    fn respects_constraint() {
        let outcome = hypergrid_search(
            &config(vec![0.0..=1.0, 0.0..=1.0]),
            |v| v[0] + v[1] <= 1.0,
            |v| -(v[0] + v[1]),
        )
        .unwrap();
        assert!(outcome.optimal_values[0] + outcome.optimal_values[1] <= 1.0 + 1e-12);
        assert!(outcome.optimal_residual < -0.9);
    }

    #[test]
    fn never_worse_than_seed() {
        let mut cfg = config(vec![0.0..=1.0]);
        cfg.max_steps = 1;
        cfg.resolution = 3;
        cfg.init_values = Some(vec![0.37]);
        let outcome = hypergrid_search(&cfg, |_| true, |v| (v[0] - 0.37).abs()).unwrap();
        assert_eq!(outcome.optimal_values, vec![0.37]);
        assert_eq!(outcome.steps, 0);
    }

    #[test]
    fn rejects_bad_config() {
        let mut cfg = config(vec![0.0..=1.0]);
        cfg.resolution = 2;
        assert!(hypergrid_search(&cfg, |_| true, |_| 0.0).is_err());
        cfg.resolution = 3;
        cfg.init_values = Some(vec![0.1, 0.2]);
        assert!(hypergrid_search(&cfg, |_| true, |_| 0.0).is_err());
    }

    #[test]
    fn infeasible_everywhere_reports_not_found() {
        let outcome = hypergrid_search(&config(vec![0.0..=1.0]), |_| false, |_| 0.0).unwrap();
        assert!(!outcome.found());
    }
}
