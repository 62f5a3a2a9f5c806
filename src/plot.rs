//! Plot data for loss surfaces and optimizer trajectories
//!
//! Nothing is rendered here. A [`PlotData`] document is serialised to JSON and
//! handed to whatever plotting frontend draws the contour and the paths.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::landscape::LossSurface;
use crate::tensor::Tensor;

/// One optimizer path across the surface
///
/// Points stop before the first non-finite row. JSON has no NaN or infinity,
/// so a diverged run keeps its finite prefix and the row where it blew up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub label: String,
    pub points: Vec<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diverged_at: Option<usize>,
}

impl Trace {
    /// # Panics
    /// If `xys` is not shaped `[n, 2]`.
    pub fn from_trajectory(label: impl Into<String>, xys: &Tensor) -> Self {
        assert!(
            xys.shape.len() == 2 && xys.shape[1] == 2,
            "Trajectory must have shape [n, 2], got {:?}",
            xys.shape
        );
        let data = xys.data();
        let rows = data.chunks(2).map(|p| [p[0], p[1]]);
        let diverged_at = rows
            .clone()
            .position(|[x, y]| !(x.is_finite() && y.is_finite()));
        let points = rows.take(diverged_at.unwrap_or(usize::MAX)).collect();

        let label = label.into();
        if let Some(row) = diverged_at {
            warn!(label = %label, row, "trajectory diverged, truncating");
        }

        Trace {
            label,
            points,
            diverged_at,
        }
    }

    pub fn is_diverged(&self) -> bool {
        self.diverged_at.is_some()
    }

    pub fn start(&self) -> Option<[f32; 2]> {
        self.points.first().copied()
    }

    /// Last finite point
    pub fn end(&self) -> Option<[f32; 2]> {
        self.points.last().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotData {
    pub title: String,
    pub surface: LossSurface,
    /// Lowest sampled point of the surface as (x, y, loss)
    pub minimum: [f32; 3],
    pub traces: Vec<Trace>,
}

impl PlotData {
    pub fn new(title: impl Into<String>, surface: LossSurface) -> Self {
        let (x, y, z) = surface.argmin();
        PlotData {
            title: title.into(),
            surface,
            minimum: [x, y, z],
            traces: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    pub fn push_trace(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    /// Everything serialised must be finite, otherwise it would come back as `null`.
    fn check_finite(&self) -> Result<()> {
        let surface_ok = self.surface.z.iter().flatten().all(|v| v.is_finite());
        if !surface_ok || !self.minimum.iter().all(|v| v.is_finite()) {
            return Err(Error::NonFinite(format!(
                "surface of \"{}\" contains non-finite values",
                self.title
            )));
        }
        if let Some(trace) = self
            .traces
            .iter()
            .find(|t| t.points.iter().flatten().any(|v| !v.is_finite()))
        {
            return Err(Error::NonFinite(format!(
                "trace \"{}\" contains non-finite points",
                trace.label
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        self.check_finite()?;
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.check_finite()?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;

        info!(path = %path.display(), traces = self.traces.len(), "wrote plot data");
        Ok(())
    }
}
