//! Trajectory archive
//!
//! Particle positions are recorded at frame boundaries into one flat
//! `frames × particles × 3` buffer and written as
//! `gzip(magic ++ bincode(TrajectoryArchive))`. Writing returns the file's
//! SHA-256 digest and path, which is everything an external run tracker
//! needs from a run.

use anyhow::{bail, ensure, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use horizon_field::Particle;
use horizon_math::{Lattice3, Shape3};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// First bytes of every decompressed archive.
pub const ARCHIVE_MAGIC: &[u8; 8] = b"HZTRAJ01";

/// Everything a run persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryArchive {
    pub frames: usize,
    pub particles: usize,
    pub fps: f32,
    pub dt: f32,
    pub dx: f32,
    pub lattice_size: usize,
    /// Row-major `frames × particles × 3`
    pub positions: Vec<f32>,
    /// Row-major `particles × 3`
    pub final_velocities: Vec<f32>,
    pub final_metric: Option<(Shape3, Vec<f32>)>,
}

impl TrajectoryArchive {
    /// `(F, N, 3)`
    pub fn positions_shape(&self) -> (usize, usize, usize) {
        (self.frames, self.particles, 3)
    }

    /// Positions of every particle at recorded frame `i`, `particles × 3` floats.
    pub fn frame(&self, i: usize) -> Option<&[f32]> {
        if i >= self.frames {
            return None;
        }
        let stride = self.particles * 3;
        self.positions.get(i * stride..(i + 1) * stride)
    }

    /// Position of particle `p` at recorded frame `i`.
    pub fn position(&self, i: usize, p: usize) -> Option<[f32; 3]> {
        if p >= self.particles {
            return None;
        }
        let frame = self.frame(i)?;
        Some([frame[p * 3], frame[p * 3 + 1], frame[p * 3 + 2]])
    }

    pub fn final_metric_lattice(&self) -> Result<Option<Lattice3>> {
        match &self.final_metric {
            Some((shape, data)) => Ok(Some(Lattice3::from_vec(*shape, data.clone())?)),
            None => Ok(None),
        }
    }

    /// Check buffer lengths agree with the declared counts.
    pub fn validate(&self) -> Result<()> {
        let expected = self.frames * self.particles * 3;
        ensure!(
            self.positions.len() == expected,
            "archive holds {} position floats, expected {} ({} frames x {} particles x 3)",
            self.positions.len(),
            expected,
            self.frames,
            self.particles
        );
        ensure!(
            self.final_velocities.len() == self.particles * 3,
            "archive holds {} velocity floats, expected {}",
            self.final_velocities.len(),
            self.particles * 3
        );
        if let Some((shape, data)) = &self.final_metric {
            ensure!(
                data.len() == shape.len(),
                "final metric holds {} cells, shape {} needs {}",
                data.len(),
                shape,
                shape.len()
            );
        }
        Ok(())
    }
}

/// Accumulates particle positions at frame boundaries.
#[derive(Debug, Clone)]
pub struct TrajectoryRecorder {
    particles: usize,
    frames: usize,
    positions: Vec<f32>,
}

impl TrajectoryRecorder {
    pub fn new(particles: usize) -> Self {
        Self::with_capacity(particles, 0)
    }

    pub fn with_capacity(particles: usize, frames: usize) -> Self {
        Self {
            particles,
            frames: 0,
            positions: Vec::with_capacity(frames * particles * 3),
        }
    }

    /// Append one snapshot. The population size never changes within a run.
    pub fn record(&mut self, particles: &[Particle]) -> Result<()> {
        if particles.len() != self.particles {
            bail!(
                "snapshot has {} particles, recorder expects {}",
                particles.len(),
                self.particles
            );
        }
        self.positions
            .extend(particles.iter().flat_map(|p| p.position));
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn particles(&self) -> usize {
        self.particles
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// Seal the recording into an archive.
    pub fn finish(
        self,
        meta: ArchiveMeta,
        final_particles: &[Particle],
        final_metric: Option<&Lattice3>,
    ) -> Result<TrajectoryArchive> {
        if final_particles.len() != self.particles {
            bail!(
                "final state has {} particles, recorder expects {}",
                final_particles.len(),
                self.particles
            );
        }
        Ok(TrajectoryArchive {
            frames: self.frames,
            particles: self.particles,
            fps: meta.fps,
            dt: meta.dt,
            dx: meta.dx,
            lattice_size: meta.lattice_size,
            positions: self.positions,
            final_velocities: final_particles.iter().flat_map(|p| p.velocity).collect(),
            final_metric: final_metric.map(|m| (m.shape(), m.data().to_vec())),
        })
    }
}

/// Run-level scalars stored alongside the trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchiveMeta {
    pub fps: f32,
    pub dt: f32,
    pub dx: f32,
    pub lattice_size: usize,
}

/// Hand-off for the experiment tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReceipt {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the archive file
    pub sha256: String,
    pub bytes: u64,
}

/// Compress and write an archive, returning its content hash.
pub fn write_archive(archive: &TrajectoryArchive, path: impl AsRef<Path>) -> Result<ArchiveReceipt> {
    let path = path.as_ref();
    archive.validate().context("refusing to write inconsistent archive")?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create archive {}", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    encoder.write_all(ARCHIVE_MAGIC)?;
    bincode::serialize_into(&mut encoder, archive).context("Failed to encode archive")?;
    let mut writer = encoder.finish().context("Failed to finish gzip stream")?;
    writer.flush()?;
    drop(writer);

    let (sha256, bytes) = sha256_file(path)?;
    Ok(ArchiveReceipt {
        path: path.to_path_buf(),
        sha256,
        bytes,
    })
}

/// Decode and validate an archive.
pub fn read_archive(path: impl AsRef<Path>) -> Result<TrajectoryArchive> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open archive {}", path.display()))?;
    let mut decoder = GzDecoder::new(BufReader::new(file));

    let mut magic = [0u8; 8];
    decoder
        .read_exact(&mut magic)
        .with_context(|| format!("{} is not a trajectory archive", path.display()))?;
    if &magic != ARCHIVE_MAGIC {
        bail!("{} has wrong archive magic {:?}", path.display(), magic);
    }

    let archive: TrajectoryArchive =
        bincode::deserialize_from(&mut decoder).context("Failed to decode archive")?;
    archive.validate()?;
    Ok(archive)
}

/// Lowercase hex SHA-256 and byte length of a file.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<(String, u64)> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let bytes = std::io::copy(&mut file, &mut hasher)?;
    Ok((format!("{:x}", hasher.finalize()), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ArchiveMeta {
        ArchiveMeta {
            fps: 20.0,
            dt: 0.05,
            dx: 1.0,
            lattice_size: 8,
        }
    }

    fn particles(n: usize, t: f32) -> Vec<Particle> {
        (0..n)
            .map(|i| Particle {
                position: [i as f32, t, -t],
                velocity: [0.0, 1.0, -1.0],
            })
            .collect()
    }

    #[test]
    fn test_recorder_layout() {
        let mut rec = TrajectoryRecorder::new(2);
        rec.record(&particles(2, 0.0)).unwrap();
        rec.record(&particles(2, 1.0)).unwrap();
        let archive = rec.finish(meta(), &particles(2, 1.0), None).unwrap();
        assert_eq!(archive.positions_shape(), (2, 2, 3));
        assert_eq!(archive.frame(1).unwrap(), &[0.0, 1.0, -1.0, 1.0, 1.0, -1.0]);
        assert_eq!(archive.position(0, 1), Some([1.0, 0.0, 0.0]));
        assert_eq!(archive.frame(2), None);
        assert_eq!(archive.final_velocities.len(), 6);
    }

    #[test]
    fn test_recorder_rejects_population_change() {
        let mut rec = TrajectoryRecorder::new(3);
        assert!(rec.record(&particles(2, 0.0)).is_err());
        assert_eq!(rec.frames(), 0);
    }

    #[test]
    fn test_write_read_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.hz");
        let mut rec = TrajectoryRecorder::with_capacity(4, 3);
        for t in 0..3 {
            rec.record(&particles(4, t as f32)).unwrap();
        }
        let metric = Lattice3::random_uniform(Shape3::cubic(6), -1.0, 1.0, 5);
        let archive = rec.finish(meta(), &particles(4, 2.0), Some(&metric)).unwrap();

        let receipt = write_archive(&archive, &path).unwrap();
        assert_eq!(receipt.path, path);
        assert_eq!(receipt.sha256.len(), 64);
        assert!(receipt.sha256.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sha256_file(&path).unwrap(), (receipt.sha256.clone(), receipt.bytes));

        let restored = read_archive(&path).unwrap();
        assert_eq!(restored, archive);
        assert_eq!(restored.final_metric_lattice().unwrap(), Some(metric));
    }

    #[test]
    fn test_read_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, b"not gzip at all").unwrap();
        assert!(read_archive(&plain).is_err());

        let wrong_magic = dir.path().join("wrong.gz");
        let mut enc = GzEncoder::new(File::create(&wrong_magic).unwrap(), Compression::fast());
        enc.write_all(b"NOTMAGIC and then some").unwrap();
        enc.finish().unwrap();
        let err = read_archive(&wrong_magic).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_inconsistent_archive_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = TrajectoryRecorder::new(1)
            .finish(meta(), &particles(1, 0.0), None)
            .unwrap();
        archive.frames = 5;
        assert!(write_archive(&archive, dir.path().join("bad.hz")).is_err());
    }
}
