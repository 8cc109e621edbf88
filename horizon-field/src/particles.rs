//! Particle Integrator
//!
//! Unit-mass test particles driven by the force field. Each particle samples
//! the force at the interior cell nearest its position (see
//! [`CellMap`](horizon_math::CellMap)); positions outside the lattice are
//! clamped onto the boundary-adjacent cells, so an escaped particle keeps
//! moving under the edge force instead of being rejected.
//!
//! Two schemes are available:
//! - `Euler`: `v += F(x)·dt`, then `x += v·dt`
//! - `VelocityVerlet`: half kick, drift, resample, half kick

use horizon_math::CellMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::checks::ensure_positive;
use crate::error::FieldResult;
use crate::force::ForceField;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Particle {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
}

impl Particle {
    pub fn at_rest(position: [f32; 3]) -> Self {
        Self {
            position,
            velocity: [0.0; 3],
        }
    }

    pub fn speed_squared(&self) -> f32 {
        self.velocity.iter().map(|v| v * v).sum()
    }
}

/// Time-stepping scheme for the particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegratorMethod {
    Euler,
    #[default]
    VelocityVerlet,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorParams {
    pub dt: f32,
    pub dx: f32,
    pub method: IntegratorMethod,
}

impl Default for IntegratorParams {
    fn default() -> Self {
        Self {
            dt: 0.05,
            dx: 1.0,
            method: IntegratorMethod::default(),
        }
    }
}

/// Cell map matching an `n³` force field (the interior of an `(n+2)³` lattice).
pub fn force_cell_map(force: &ForceField, dx: f32) -> CellMap {
    CellMap::for_full_lattice(force.shape().nx + 2, dx)
}

/// Force at the clamped interior cell nearest `position`.
#[inline]
pub fn sample_force(force: &ForceField, map: &CellMap, position: [f32; 3]) -> [f32; 3] {
    force.at(map.interior_cell(position))
}

/// Advance every particle by one step, in place.
pub fn integrate(particles: &mut [Particle], force: &ForceField, params: &IntegratorParams) -> FieldResult<()> {
    force.validate()?;
    ensure_positive(params.dt, "dt")?;
    ensure_positive(params.dx, "dx")?;

    let map = force_cell_map(force, params.dx);
    let dt = params.dt;

    match params.method {
        IntegratorMethod::Euler => {
            for p in particles.iter_mut() {
                let a = sample_force(force, &map, p.position);
                for d in 0..3 {
                    p.velocity[d] += a[d] * dt;
                    p.position[d] += p.velocity[d] * dt;
                }
            }
        }
        IntegratorMethod::VelocityVerlet => {
            let half = 0.5 * dt;
            for p in particles.iter_mut() {
                let a0 = sample_force(force, &map, p.position);
                for d in 0..3 {
                    p.velocity[d] += a0[d] * half;
                    p.position[d] += p.velocity[d] * dt;
                }
                let a1 = sample_force(force, &map, p.position);
                for d in 0..3 {
                    p.velocity[d] += a1[d] * half;
                }
            }
        }
    }
    Ok(())
}

/// Total kinetic energy `½ Σ |v|²` (unit mass).
pub fn kinetic_energy(particles: &[Particle]) -> f64 {
    0.5 * particles
        .iter()
        .map(|p| p.speed_squared() as f64)
        .sum::<f64>()
}

/// `n` particles uniform in the cube `[-half_side, half_side)³`, each moving
/// radially outward at `speed`. Deterministic for a given `seed`.
pub fn random_particles(n: usize, half_side: f32, speed: f32, seed: u64) -> Vec<Particle> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let span = 2.0 * half_side;
    (0..n)
        .map(|_| {
            let position = [
                -half_side + span * rng.gen::<f32>(),
                -half_side + span * rng.gen::<f32>(),
                -half_side + span * rng.gen::<f32>(),
            ];
            let r = position.iter().map(|c| c * c).sum::<f32>().sqrt();
            let velocity = if r > 0.0 {
                position.map(|c| speed * c / r)
            } else {
                [0.0; 3]
            };
            Particle { position, velocity }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use approx::assert_abs_diff_eq;
    use horizon_math::{Lattice3, Shape3};

    fn uniform_force(n: usize, f: [f32; 3]) -> ForceField {
        let shape = Shape3::cubic(n);
        ForceField {
            fx: Lattice3::filled(shape, f[0]),
            fy: Lattice3::filled(shape, f[1]),
            fz: Lattice3::filled(shape, f[2]),
        }
    }

    #[test]
    fn test_euler_step() {
        let force = uniform_force(6, [1.0, 0.0, -2.0]);
        let mut ps = vec![Particle::at_rest([0.0; 3])];
        let params = IntegratorParams {
            dt: 0.1,
            dx: 1.0,
            method: IntegratorMethod::Euler,
        };
        integrate(&mut ps, &force, &params).unwrap();
        assert_abs_diff_eq!(ps[0].velocity[0], 0.1, epsilon = 1e-7);
        assert_abs_diff_eq!(ps[0].velocity[2], -0.2, epsilon = 1e-7);
        assert_abs_diff_eq!(ps[0].position[0], 0.01, epsilon = 1e-7);
        assert_abs_diff_eq!(ps[0].position[2], -0.02, epsilon = 1e-7);
    }

    #[test]
    fn test_verlet_uniform_force_is_exact() {
        let force = uniform_force(6, [2.0, 0.0, 0.0]);
        let mut ps = vec![Particle {
            position: [0.0; 3],
            velocity: [1.0, 0.0, 0.0],
        }];
        let params = IntegratorParams {
            dt: 0.5,
            dx: 1.0,
            method: IntegratorMethod::VelocityVerlet,
        };
        integrate(&mut ps, &force, &params).unwrap();
        // x = v0·t + ½·a·t², v = v0 + a·t
        assert_abs_diff_eq!(ps[0].position[0], 0.5 + 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(ps[0].velocity[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_verlet_resamples_after_drift() {
        // Force only in the cell the particle drifts into.
        let shape = Shape3::cubic(6);
        let mut fx = Lattice3::zeros(shape);
        fx.set(4, 3, 3, 1.0);
        let force = ForceField {
            fx,
            fy: Lattice3::zeros(shape),
            fz: Lattice3::zeros(shape),
        };
        let mut ps = vec![Particle {
            position: [0.0; 3],
            velocity: [1.0, 0.0, 0.0],
        }];
        let params = IntegratorParams {
            dt: 1.0,
            dx: 1.0,
            method: IntegratorMethod::VelocityVerlet,
        };
        integrate(&mut ps, &force, &params).unwrap();
        assert_abs_diff_eq!(ps[0].position[0], 1.0);
        assert_abs_diff_eq!(ps[0].velocity[0], 1.5);
    }

    #[test]
    fn test_out_of_domain_samples_clamped_cell() {
        // L = 8 ⇒ interior 6 ⇒ valid index range [0, 5].
        let shape = Shape3::cubic(6);
        let mut fx = Lattice3::zeros(shape);
        fx.set(5, 0, 5, 3.0);
        let force = ForceField {
            fx,
            fy: Lattice3::zeros(shape),
            fz: Lattice3::zeros(shape),
        };
        let map = force_cell_map(&force, 1.0);
        assert_eq!(map.interior_cell([1.0e4, -1.0e4, 99.0]), [5, 0, 5]);
        assert_eq!(sample_force(&force, &map, [1.0e4, -1.0e4, 99.0]), [3.0, 0.0, 0.0]);

        let mut ps = vec![Particle::at_rest([1.0e4, -1.0e4, 99.0])];
        let params = IntegratorParams {
            dt: 1.0,
            dx: 1.0,
            method: IntegratorMethod::Euler,
        };
        integrate(&mut ps, &force, &params).unwrap();
        integrate(&mut ps, &force, &params).unwrap();
        // Keeps accelerating under the edge force.
        assert_abs_diff_eq!(ps[0].velocity[0], 6.0);
        assert!(ps[0].position[0] > 1.0e4);
    }

    #[test]
    fn test_rejects_mismatched_force() {
        let mut force = uniform_force(4, [0.0; 3]);
        force.fy = Lattice3::zeros(Shape3::cubic(3));
        let err = integrate(&mut [Particle::default()], &force, &IntegratorParams::default()).unwrap_err();
        assert!(matches!(err, FieldError::InvalidShape { .. }));
    }

    #[test]
    fn test_kinetic_energy() {
        let ps = [
            Particle {
                position: [0.0; 3],
                velocity: [1.0, 2.0, 2.0],
            },
            Particle::at_rest([1.0; 3]),
        ];
        assert_abs_diff_eq!(kinetic_energy(&ps), 4.5);
    }

    #[test]
    fn test_random_particles_bounded_and_radial() {
        let ps = random_particles(200, 3.0, 0.1, 9);
        assert_eq!(ps.len(), 200);
        assert_eq!(ps, random_particles(200, 3.0, 0.1, 9));
        for p in &ps {
            assert!(p.position.iter().all(|c| (-3.0..3.0).contains(c)));
            assert_abs_diff_eq!(p.speed_squared().sqrt(), 0.1, epsilon = 1e-5);
            let dot: f32 = (0..3).map(|d| p.position[d] * p.velocity[d]).sum();
            assert!(dot > 0.0, "velocity should point outward");
        }
    }

    #[test]
    fn test_default_method_is_verlet() {
        assert_eq!(IntegratorMethod::default(), IntegratorMethod::VelocityVerlet);
    }
}
