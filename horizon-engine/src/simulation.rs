// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Simulation: top-level frame-loop driver
//!
//! Owns the entropy field, the metric lattice, the particle population and
//! the compute backend for the lifetime of a run, and lends them to each
//! stage by reference. Every call to `step()` advances one frame:
//! relaxation → force extraction → integration. The entropy field is built
//! once, before the first frame.

use anyhow::{bail, Context, Result};
use horizon_field::particles::{integrate, kinetic_energy, random_particles};
use horizon_field::{EntropyField, EntropySource, Particle};
use horizon_gpu::ComputeBackend;
use horizon_math::{Lattice3, Shape3};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::backend::{select_backend, BackendReport};
use crate::config::SimulationConfig;
use crate::trajectory::{write_archive, ArchiveMeta, ArchiveReceipt, TrajectoryRecorder};
use crate::weights::load_weights;

/// Diagnostics of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStats {
    /// 1-based index of the frame just completed
    pub frame: usize,
    pub effective_dt: f32,
    pub guard_engaged: bool,
    pub metric_max_abs: f32,
    pub metric_norm: f32,
    /// Largest force magnitude on the lattice this frame
    pub max_force: f32,
    pub kinetic_energy: f64,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub frames: usize,
    pub recorded_frames: usize,
    pub guard_activations: usize,
    pub entropy_source: EntropySource,
    pub backend: BackendReport,
    pub final_kinetic_energy: f64,
    pub final_metric_max_abs: f32,
}

/// A single simulation run.
pub struct Simulation {
    config: SimulationConfig,
    entropy: EntropyField,
    metric: Lattice3,
    particles: Vec<Particle>,
    backend: Box<dyn ComputeBackend>,
    backend_report: BackendReport,
    frame: usize,
    guard_activations: usize,
}

impl Simulation {
    /// Build a run from configuration.
    ///
    /// Particles are seeded from `config.seed`. With a weights file the
    /// entropy field is splashed at the particles' initial positions (node i
    /// at particle i); without one it is the synthetic impulse.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.ensure_valid()?;
        let particles = random_particles(
            config.num_particles,
            config.particle_half_side(),
            config.initial_speed,
            config.seed,
        );

        let entropy = match &config.weights_path {
            Some(path) => {
                let weights = load_weights(path)?;
                if weights.dim() != config.num_particles {
                    bail!(
                        "weight matrix {} has {} nodes but the run has {} particles",
                        path.display(),
                        weights.dim(),
                        config.num_particles
                    );
                }
                let positions: Vec<[f32; 3]> = particles.iter().map(|p| p.position).collect();
                EntropyField::from_weights(
                    &weights,
                    &positions,
                    config.lattice_size,
                    config.dx,
                    config.splash_sigma,
                )
                .context("Failed to build entropy field from weights")?
            }
            None => EntropyField::synthetic(config.lattice_size)?,
        };

        Self::with_state(config, entropy, particles)
    }

    /// Build a run from an explicit entropy field and particle population.
    pub fn with_state(
        config: SimulationConfig,
        entropy: EntropyField,
        particles: Vec<Particle>,
    ) -> Result<Self> {
        config.ensure_valid()?;
        let size = entropy.validate().context("invalid entropy field")?;
        if size != config.lattice_size {
            bail!(
                "entropy field side {} does not match lattice_size {}",
                size,
                config.lattice_size
            );
        }
        if particles.len() != config.num_particles {
            bail!(
                "{} particles supplied but num_particles is {}",
                particles.len(),
                config.num_particles
            );
        }

        let (backend, backend_report) = select_backend(config.backend);
        let metric = Lattice3::zeros(Shape3::cubic(size - 2));

        info!(
            lattice = size,
            particles = particles.len(),
            frames = config.frames,
            dt = config.dt(),
            entropy = ?entropy.source,
            backend = %backend_report.active,
            "simulation ready"
        );

        Ok(Self {
            config,
            entropy,
            metric,
            particles,
            backend,
            backend_report,
            frame: 0,
            guard_activations: 0,
        })
    }

    /// Advance one frame: relax the metric, extract forces, move particles.
    pub fn step(&mut self) -> Result<FrameStats> {
        let frame = self.frame + 1;
        let relax = self
            .backend
            .relax_metric(
                &mut self.metric,
                &self.entropy.lattice,
                &self.config.relaxation_params(),
            )
            .with_context(|| format!("frame {frame}: metric relaxation failed"))?;

        let force = self
            .backend
            .force_field(&self.metric, self.config.dx)
            .with_context(|| format!("frame {frame}: force extraction failed"))?;

        integrate(&mut self.particles, &force, &self.config.integrator_params())
            .with_context(|| format!("frame {frame}: particle integration failed"))?;

        self.frame = frame;
        if relax.guard_engaged {
            self.guard_activations += 1;
        }

        let stats = FrameStats {
            frame,
            effective_dt: relax.effective_dt,
            guard_engaged: relax.guard_engaged,
            metric_max_abs: relax.metric_max_abs,
            metric_norm: relax.metric_norm,
            max_force: force.max_magnitude(),
            kinetic_energy: kinetic_energy(&self.particles),
        };
        debug!(?stats, "frame complete");
        Ok(stats)
    }

    /// Run the remaining frames, snapshotting every `record_every` frames.
    pub fn run(&mut self, recorder: &mut TrajectoryRecorder) -> Result<RunSummary> {
        let every = self.config.record_every;
        while self.frame < self.config.frames {
            let stats = self.step()?;
            if stats.frame % every == 0 {
                recorder.record(&self.particles)?;
            }
        }

        let summary = RunSummary {
            frames: self.frame,
            recorded_frames: recorder.frames(),
            guard_activations: self.guard_activations,
            entropy_source: self.entropy.source,
            backend: self.backend_report.clone(),
            final_kinetic_energy: kinetic_energy(&self.particles),
            final_metric_max_abs: self.metric.max_abs(),
        };
        info!(
            frames = summary.frames,
            recorded = summary.recorded_frames,
            guard_activations = summary.guard_activations,
            "simulation finished"
        );
        Ok(summary)
    }

    /// Run to completion and write the trajectory archive to `path`.
    pub fn run_to_archive(&mut self, path: impl AsRef<Path>) -> Result<(RunSummary, ArchiveReceipt)> {
        let mut recorder =
            TrajectoryRecorder::with_capacity(self.particles.len(), self.config.recorded_frames());
        let summary = self.run(&mut recorder)?;

        let meta = ArchiveMeta {
            fps: self.config.fps,
            dt: self.config.dt(),
            dx: self.config.dx,
            lattice_size: self.config.lattice_size,
        };
        let metric = self.config.save_metric.then_some(&self.metric);
        let archive = recorder.finish(meta, &self.particles, metric)?;
        let receipt = write_archive(&archive, path)?;
        info!(path = %receipt.path.display(), sha256 = %receipt.sha256, "trajectory archived");
        Ok((summary, receipt))
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn entropy(&self) -> &EntropyField {
        &self.entropy
    }

    pub fn metric(&self) -> &Lattice3 {
        &self.metric
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Frames completed so far.
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend_report(&self) -> &BackendReport {
        &self.backend_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSelection;

    #[test]
    fn test_smoke_run_records_every_frame() {
        let config = SimulationConfig::smoke();
        let mut sim = Simulation::new(config.clone()).unwrap();
        assert_eq!(sim.entropy().source, EntropySource::Synthetic);
        assert_eq!(sim.metric().shape(), Shape3::cubic(config.lattice_size - 2));

        let mut rec = TrajectoryRecorder::new(config.num_particles);
        let summary = sim.run(&mut rec).unwrap();
        assert_eq!(summary.frames, config.frames);
        assert_eq!(rec.frames(), config.frames);
        assert!(summary.final_metric_max_abs > 0.0);
        assert_eq!(sim.particles().len(), config.num_particles);
    }

    #[test]
    fn test_record_stride() {
        let config = SimulationConfig {
            frames: 7,
            record_every: 3,
            ..SimulationConfig::smoke()
        };
        let mut sim = Simulation::new(config.clone()).unwrap();
        let mut rec = TrajectoryRecorder::new(config.num_particles);
        sim.run(&mut rec).unwrap();
        assert_eq!(rec.frames(), 2);
        assert_eq!(config.recorded_frames(), 2);
    }

    #[test]
    fn test_run_is_deterministic_for_seed() {
        let config = SimulationConfig::smoke();
        let mut a = Simulation::new(config.clone()).unwrap();
        let mut b = Simulation::new(config).unwrap();
        for _ in 0..3 {
            assert_eq!(a.step().unwrap(), b.step().unwrap());
        }
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            lattice_size: 2,
            ..SimulationConfig::smoke()
        };
        assert!(Simulation::new(config).is_err());
    }

    #[test]
    fn test_population_must_match_config() {
        let config = SimulationConfig::smoke();
        let entropy = EntropyField::synthetic(config.lattice_size).unwrap();
        assert!(Simulation::with_state(config, entropy, vec![Particle::default()]).is_err());
    }

    #[test]
    fn test_weights_dimension_must_match_particles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.txt");
        std::fs::write(&path, "1 0\n0 1\n").unwrap();
        let config = SimulationConfig {
            weights_path: Some(path),
            ..SimulationConfig::smoke()
        };
        let err = Simulation::new(config).err().expect("dimension mismatch must fail");
        assert!(err.to_string().contains("particles"));
    }

    #[test]
    fn test_gpu_request_still_runs() {
        let config = SimulationConfig {
            backend: BackendSelection::Gpu { device_id: 0 },
            frames: 2,
            ..SimulationConfig::smoke()
        };
        let mut sim = Simulation::new(config).unwrap();
        assert_eq!(sim.backend_name(), sim.backend_report().active);
        sim.step().unwrap();
    }
}
