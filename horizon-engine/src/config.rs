//! Runtime configuration for Horizon runs
//!
//! One serde struct carries every scalar a run consumes, plus the compute
//! backend choice. Presets cover the production-sized run and a small
//! smoke run.

use anyhow::{bail, Context, Result};
use horizon_field::{CurvatureParams, IntegratorMethod, IntegratorParams, RelaxationParams};
use horizon_field::relaxation::DIVERGENCE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compute backend selection, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendSelection {
    /// CPU reference implementation
    Cpu,
    /// CUDA GPU acceleration
    Gpu { device_id: usize },
}

/// Metric relaxation knobs that do not depend on dt/dx.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationConfig {
    /// Damping coefficient on the metric (must be >= 0)
    pub damping: f32,
    /// Stability guard bound as a fraction of dx²
    pub safety: f32,
    /// Metric L2 norm treated as divergence
    pub divergence_threshold: f32,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            damping: 0.1,
            safety: 0.4,
            divergence_threshold: DIVERGENCE_THRESHOLD,
        }
    }
}

/// Full configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Side length L of the entropy lattice
    pub lattice_size: usize,
    /// Fixed particle population
    pub num_particles: usize,
    /// Frames to simulate
    pub frames: usize,
    /// Frames per second; dt = 1/fps unless `dt` is set
    pub fps: f32,
    /// Explicit timestep override
    pub dt: Option<f32>,
    /// Lattice spacing
    pub dx: f32,
    pub curvature: CurvatureParams,
    pub relaxation: RelaxationConfig,
    /// Gaussian splash width in cells
    pub splash_sigma: f32,
    pub integrator: IntegratorMethod,
    pub backend: BackendSelection,
    /// Seed for particle initialization
    pub seed: u64,
    /// Initial outward radial speed of every particle
    pub initial_speed: f32,
    /// Frames between trajectory snapshots
    pub record_every: usize,
    /// Store the final metric lattice in the archive
    pub save_metric: bool,
    /// Node-weight matrix file; `None` selects the synthetic impulse
    pub weights_path: Option<PathBuf>,
}

impl SimulationConfig {
    /// Production-sized run: 64³ lattice, 5000 particles, 250 frames at 20 fps.
    pub fn phase3() -> Self {
        Self {
            lattice_size: 64,
            num_particles: 5000,
            frames: 250,
            fps: 20.0,
            dt: None,
            dx: 1.0,
            curvature: CurvatureParams::default(),
            relaxation: RelaxationConfig::default(),
            splash_sigma: 1.0,
            integrator: IntegratorMethod::VelocityVerlet,
            backend: BackendSelection::Gpu { device_id: 0 },
            seed: 0,
            initial_speed: 0.1,
            record_every: 1,
            save_metric: true,
            weights_path: None,
        }
    }

    /// Small CPU run for tests and quick checks.
    ///
    /// Uses γ = 0: with the default γ = -1 the diagonal and Laplacian terms
    /// cancel and a synthetic impulse never moves the metric.
    pub fn smoke() -> Self {
        Self {
            lattice_size: 12,
            num_particles: 32,
            frames: 8,
            curvature: CurvatureParams {
                gamma: 0.0,
                ..CurvatureParams::default()
            },
            backend: BackendSelection::Cpu,
            save_metric: false,
            ..Self::phase3()
        }
    }

    /// Effective timestep.
    pub fn dt(&self) -> f32 {
        self.dt.unwrap_or(1.0 / self.fps)
    }

    /// Half side of the cube particles are seeded in, `(L - 4)/2 · dx`.
    pub fn particle_half_side(&self) -> f32 {
        self.lattice_size.saturating_sub(4) as f32 * 0.5 * self.dx
    }

    /// Number of snapshots a full run records.
    pub fn recorded_frames(&self) -> usize {
        if self.record_every == 0 {
            return 0;
        }
        self.frames / self.record_every
    }

    pub fn relaxation_params(&self) -> RelaxationParams {
        RelaxationParams {
            dt: self.dt(),
            dx: self.dx,
            damping: self.relaxation.damping,
            safety: self.relaxation.safety,
            divergence_threshold: self.relaxation.divergence_threshold,
            curvature: self.curvature,
        }
    }

    pub fn integrator_params(&self) -> IntegratorParams {
        IntegratorParams {
            dt: self.dt(),
            dx: self.dx,
            method: self.integrator,
        }
    }

    /// Every violated constraint, as human-readable messages.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.lattice_size < 3 {
            violations.push(format!(
                "lattice_size {} leaves no interior cells (need >= 3)",
                self.lattice_size
            ));
        }
        if self.num_particles == 0 {
            violations.push("num_particles must be >= 1".to_string());
        }
        if self.frames == 0 {
            violations.push("frames must be >= 1".to_string());
        }
        if self.record_every == 0 {
            violations.push("record_every must be >= 1".to_string());
        }
        if self.dt.is_none() && !(self.fps.is_finite() && self.fps > 0.0) {
            violations.push(format!("fps must be finite and > 0, got {}", self.fps));
        }
        let dt = self.dt();
        if !(dt.is_finite() && dt > 0.0) {
            violations.push(format!("dt must be finite and > 0, got {dt}"));
        }
        for (name, value) in [
            ("dx", self.dx),
            ("splash_sigma", self.splash_sigma),
            ("relaxation.safety", self.relaxation.safety),
            ("relaxation.divergence_threshold", self.relaxation.divergence_threshold),
        ] {
            if !(value.is_finite() && value > 0.0) {
                violations.push(format!("{name} must be finite and > 0, got {value}"));
            }
        }
        if !(self.relaxation.damping.is_finite() && self.relaxation.damping >= 0.0) {
            violations.push(format!(
                "relaxation.damping must be finite and >= 0, got {}",
                self.relaxation.damping
            ));
        }
        if !(self.initial_speed.is_finite() && self.initial_speed >= 0.0) {
            violations.push(format!(
                "initial_speed must be finite and >= 0, got {}",
                self.initial_speed
            ));
        }
        if !self.curvature.kappa.is_finite() || !self.curvature.gamma.is_finite() {
            violations.push("curvature kappa and gamma must be finite".to_string());
        }
        violations
    }

    /// Fail with every violation listed if the config is not runnable.
    pub fn ensure_valid(&self) -> Result<()> {
        let violations = self.validate();
        if !violations.is_empty() {
            bail!("invalid simulation config: {}", violations.join("; "));
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::phase3()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase3_config() {
        let config = SimulationConfig::phase3();
        assert_eq!(config.lattice_size, 64);
        assert_eq!(config.num_particles, 5000);
        assert_eq!(config.frames, 250);
        assert!((config.dt() - 0.05).abs() < 1e-7);
        assert_eq!(config.particle_half_side(), 30.0);
        assert_eq!(config.recorded_frames(), 250);
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_smoke_config_is_small_and_cpu() {
        let config = SimulationConfig::smoke();
        assert_eq!(config.backend, BackendSelection::Cpu);
        assert!(config.lattice_size < 20);
        assert_eq!(config.curvature.gamma, 0.0);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_dt_override() {
        let mut config = SimulationConfig::smoke();
        config.dt = Some(0.1);
        assert_eq!(config.dt(), 0.1);
        assert_eq!(config.relaxation_params().dt, 0.1);
        assert_eq!(config.integrator_params().dt, 0.1);
    }

    #[test]
    fn test_validation_lists_every_violation() {
        let mut config = SimulationConfig::smoke();
        config.lattice_size = 2;
        config.dx = 0.0;
        config.record_every = 0;
        config.relaxation.damping = -1.0;
        let violations = config.validate();
        assert_eq!(violations.len(), 4, "{violations:?}");
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_zero_fps_without_override_is_invalid() {
        let mut config = SimulationConfig::smoke();
        config.fps = 0.0;
        assert!(!config.validate().is_empty());
        config.dt = Some(0.05);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = SimulationConfig::phase3();
        let json = serde_json::to_string(&config).unwrap();
        let restored: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = SimulationConfig::smoke();
        config.weights_path = Some(PathBuf::from("weights.txt"));
        config.backend = BackendSelection::Gpu { device_id: 1 };
        config.to_json_file(&path).unwrap();
        assert_eq!(SimulationConfig::from_json_file(&path).unwrap(), config);
        assert!(SimulationConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
