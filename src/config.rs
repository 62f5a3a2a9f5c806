use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landscape::{LossKind, LossSurface};
use crate::optim::SgdConfig;

/// Window and resolution of the sampled loss surface
///
/// Defaults to the [`LossSurface`] plotting window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub x_range: [f32; 2],
    pub y_range: [f32; 2],
    pub n_points: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            x_range: LossSurface::DEFAULT_X_RANGE,
            y_range: LossSurface::DEFAULT_Y_RANGE,
            n_points: LossSurface::DEFAULT_POINTS,
        }
    }
}

/// A sweep of SGD settings over one loss landscape
///
/// Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub loss: LossKind,
    pub start: [f32; 2],
    pub n_iters: usize,
    pub runs: Vec<SgdConfig>,
    pub surface: SurfaceConfig,
    pub output: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let runs = [0.9, 0.95, 0.99]
            .into_iter()
            .flat_map(|momentum| {
                [0.5, 1.0]
                    .into_iter()
                    .map(move |lr| SgdConfig::new(lr).with_momentum(momentum))
            })
            .collect();

        Self {
            loss: LossKind::default(),
            start: [2.5, 2.5],
            n_iters: 100,
            runs,
            surface: SurfaceConfig::default(),
            output: PathBuf::from("trajectories.json"),
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.runs.is_empty() {
            return invalid("at least one run is required".into());
        }
        if let Some((i, run)) = self
            .runs
            .iter()
            .enumerate()
            .find(|(_, run)| !(run.lr.is_finite() && run.lr > 0.0))
        {
            return invalid(format!("run {i}: learning rate must be positive, got {}", run.lr));
        }
        if let Some((i, run)) = self
            .runs
            .iter()
            .enumerate()
            .find(|(_, run)| !(run.momentum.is_finite() && run.weight_decay.is_finite()))
        {
            return invalid(format!(
                "run {i}: momentum and weight_decay must be finite, got {} and {}",
                run.momentum, run.weight_decay
            ));
        }
        if !self.start.iter().all(|v| v.is_finite()) {
            return invalid(format!("start must be finite, got {:?}", self.start));
        }
        if self.n_iters == 0 {
            return invalid("n_iters must be at least 1".into());
        }
        if self.surface.n_points < 2 {
            return invalid(format!(
                "surface.n_points must be at least 2, got {}",
                self.surface.n_points
            ));
        }
        for (name, [lo, hi]) in [("x_range", self.surface.x_range), ("y_range", self.surface.y_range)] {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return invalid(format!(
                    "surface.{name} must be finite and ascending, got [{lo}, {hi}]"
                ));
            }
        }
        Ok(())
    }
}
