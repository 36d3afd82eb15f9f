//! Synthetic movie rendering.
//!
//! Each frame is an expected-photon image (flat background plus one Gaussian
//! spot per detection) passed through per-pixel Poisson shot noise, quantised
//! to `u16` and appended as a page of a multi-page TIFF stack. A new stack file
//! is started every `frames_per_file` frames.

use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tiff::encoder::{TiffEncoder, colortype};

use crate::error::SimResult;
use crate::random::Sampler;
use crate::structs::{PathPoint, SimulationParams, SimulationResult};

const RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Standard deviation of the Gaussian PSF.
    pub psf_sigma_um: f64,
    /// Mean background photons per pixel and frame.
    pub background_photons: f64,
    pub frames_per_file: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            psf_sigma_um: 0.13,
            background_photons: 10.0,
            frames_per_file: 1000,
        }
    }
}

pub struct MovieRenderer {
    image_size_px: usize,
    pixel_size_um: f64,
    mean_photons: f64,
    sigma_px: f64,
    background_photons: f64,
    frames_per_file: usize,
}

impl MovieRenderer {
    pub fn new(params: &SimulationParams, settings: &RenderSettings) -> Self {
        Self {
            image_size_px: params.image_size_px,
            pixel_size_um: params.pixel_size_um,
            mean_photons: params.mean_photons,
            sigma_px: settings.psf_sigma_um / params.pixel_size_um,
            background_photons: settings.background_photons,
            frames_per_file: settings.frames_per_file.max(1),
        }
    }

    /// Noise-free photon image for the given emitter positions and photon counts.
    pub fn expected_image(&self, spots: &[(PathPoint, f64)]) -> Array2<f64> {
        let n = self.image_size_px;
        let mut image = Array2::from_elem((n, n), self.background_photons);
        let radius = (4.0 * self.sigma_px).ceil();
        let two_sigma_sq = 2.0 * self.sigma_px * self.sigma_px;
        let norm = 1.0 / (PI * two_sigma_sq);

        for (point, photons) in spots {
            let x = point.x_um / self.pixel_size_um;
            let y = point.y_um / self.pixel_size_um;
            let col_lo = (x - radius).floor().max(0.0) as usize;
            let row_lo = (y - radius).floor().max(0.0) as usize;
            let col_hi = ((x + radius).ceil().max(0.0) as usize).min(n);
            let row_hi = ((y + radius).ceil().max(0.0) as usize).min(n);

            for row in row_lo..row_hi {
                let dy = row as f64 + 0.5 - y;
                for col in col_lo..col_hi {
                    let dx = col as f64 + 0.5 - x;
                    image[[row, col]] +=
                        photons * norm * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
                }
            }
        }
        image
    }

    /// Renders one noisy frame from its detections.
    pub fn render_frame<R: Rng>(
        &self,
        detections: &[PathPoint],
        sampler: &mut Sampler<R>,
    ) -> SimResult<Array2<u16>> {
        let mut spots = Vec::with_capacity(detections.len());
        for point in detections {
            spots.push((*point, sampler.poisson(self.mean_photons)? as f64));
        }
        let expected = self.expected_image(&spots);

        let mut frame = Array2::<u16>::zeros(expected.dim());
        for (pixel, &mean) in frame.iter_mut().zip(expected.iter()) {
            *pixel = sampler.poisson(mean)?.min(u16::MAX as u64) as u16;
        }
        Ok(frame)
    }

    /// Renders frames `1..=n_frames` into TIFF stacks under `dir`.
    pub fn write_movie<R: Rng>(
        &self,
        result: &SimulationResult,
        n_frames: usize,
        dir: &Path,
        sampler: &mut Sampler<R>,
    ) -> anyhow::Result<Vec<PathBuf>> {
        ensure_writable(dir)?;
        let mut files = Vec::new();
        for (index, first) in (1..=n_frames).step_by(self.frames_per_file).enumerate() {
            let last = (first + self.frames_per_file - 1).min(n_frames);
            let path = dir.join(format!("movie_{:04}.tif", index + 1));
            self.write_stack(&path, first..=last, result, sampler)?;
            files.push(path);
        }
        info!("wrote {n_frames} frames into {} movie file(s)", files.len());
        Ok(files)
    }

    fn write_stack<R: Rng>(
        &self,
        path: &Path,
        frames: RangeInclusive<usize>,
        result: &SimulationResult,
        sampler: &mut Sampler<R>,
    ) -> anyhow::Result<()> {
        let file = retry_transient(path, || File::create(path))
            .with_context(|| format!("creating {}", path.display()))?;
        let mut sink = BufWriter::new(RetryingWriter::new(file, path.to_path_buf()));
        {
            let mut encoder = TiffEncoder::new(&mut sink)?;
            for frame in frames {
                let image = self.render_frame(result.detections_in_frame(frame), sampler)?;
                write_page(&mut encoder, &image)?;
            }
        }
        sink.flush().with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn write_page<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    image: &Array2<u16>,
) -> anyhow::Result<()> {
    let (height, width) = image.dim();
    let data: Vec<u16> = image.iter().copied().collect();
    encoder.write_image::<colortype::Gray16>(width as u32, height as u32, &data)?;
    Ok(())
}

fn ensure_writable(dir: &Path) -> anyhow::Result<()> {
    let check = dir.join(".movie_write_check");
    File::create(&check)
        .and_then(|_| fs::remove_file(&check))
        .with_context(|| format!("movie directory {} is not writable", dir.display()))
}

/// Byte sink that retries each write, flush and seek on transient errors.
///
/// A failed write call transfers nothing, so repeating it keeps the TIFF
/// stream intact.
struct RetryingWriter<W> {
    inner: W,
    path: PathBuf,
}

impl<W> RetryingWriter<W> {
    fn new(inner: W, path: PathBuf) -> Self {
        Self { inner, path }
    }
}

impl<W: Write> Write for RetryingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        retry_transient(&self.path, || inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner = &mut self.inner;
        retry_transient(&self.path, || inner.flush())
    }
}

impl<W: Seek> Seek for RetryingWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let inner = &mut self.inner;
        retry_transient(&self.path, || inner.seek(pos))
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
    )
}

/// Retries `op` for as long as it fails with a contention-type I/O error.
fn retry_transient<T>(path: &Path, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) => {
                warn!("{} busy ({err}), retrying", path.display());
                thread::sleep(RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}
