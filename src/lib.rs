//! Turns a short video clip into a looping GIF, entirely in-process:
//! fixed-rate frame sampling, a palette trained on the first frame,
//! LZW compression, and byte-exact GIF89a output.

use rgb::*;

mod error;
pub use crate::error::*;
pub mod encoder;
pub mod lzw;
pub mod progress;
pub mod quant;
pub mod source;

pub use crate::encoder::{DisposalMethod, Encoder, Frame};
pub use crate::progress::{NoProgress, ProgressReporter};
pub use crate::quant::NeuQuant;
#[cfg(feature = "png")]
pub use crate::source::PngSequence;
pub use crate::source::VideoSource;

use resize::Pixel;
use resize::Type::Lanczos3;

/// Number of repetitions
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Repeat {
    /// Play once, no loop extension written
    Once,
    #[default]
    Infinite,
    /// Loop this many extra times
    Finite(u16),
}

/// Conversion knobs. The defaults match the embedded-player profile:
/// at most 480 px wide, sampled at 15 fps, looping forever.
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Downscale frames wider than this. Never upscales.
    pub max_width: u32,
    /// Sampling rate in frames per second.
    pub fps: f64,
    /// How many times the finished GIF should play.
    pub repeat: Repeat,
    /// Lower quality, but faster palette training.
    pub fast: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_width: 480,
            fps: 15.0,
            repeat: Repeat::Infinite,
            fast: false,
        }
    }
}

impl Settings {
    pub(crate) fn samplefac(&self) -> i32 {
        if self.fast { 10 } else { 1 }
    }
}

/// Converts a whole clip into a GIF in one sequential pass.
///
/// Frames are pulled from the source at `settings.fps` (`floor(duration × fps) + 1`
/// of them, so even a zero-length clip yields one frame), downscaled to fit
/// `settings.max_width`, indexed through a palette trained on the first frame,
/// and written out as they come. After every frame the reporter gets the
/// fraction done, a monotone value in `[0, 1)`; returning `false` from it
/// abandons the conversion with [`Error::Aborted`].
///
/// Returns the complete GIF. Nothing is kept between calls, and on error no
/// partial output escapes.
pub fn convert<S: VideoSource + ?Sized>(
    source: &mut S,
    settings: Settings,
    reporter: &mut dyn ProgressReporter,
) -> GifResult<Vec<u8>> {
    if !settings.fps.is_finite() || settings.fps <= 0.0 {
        return Err(Error::Surface(format!("invalid frame rate: {}", settings.fps)));
    }
    let (native_width, native_height) = source.dimensions();
    if native_width == 0 || native_height == 0 {
        return Err(Error::Surface(format!("video has no pixels ({native_width}×{native_height})")));
    }

    let width = native_width.min(settings.max_width).max(1);
    let height = ((f64::from(width) * f64::from(native_height) / f64::from(native_width)).round() as u32).max(1);
    let (width, height) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(Error::Surface(format!("canvas {width}×{height} won't fit in a GIF"))),
    };

    let mut scaler = if (u32::from(width), u32::from(height)) != (native_width, native_height) {
        Some(resize::new(
            native_width as usize,
            native_height as usize,
            width.into(),
            height.into(),
            Pixel::RGB8,
            Lanczos3,
        )?)
    } else {
        None
    };

    let fps = settings.fps;
    let duration = source.duration();
    let total_frames = if duration.is_finite() && duration > 0.0 {
        ((duration * fps).floor() as u64).saturating_add(1)
    } else {
        1
    };
    let delay = (100.0 / fps).round() as u16;

    let mut capture = |k: u64, canvas: &mut [RGB8]| -> GifResult<()> {
        let frame = source.seek_frame(k as f64 / fps)?;
        if (frame.width(), frame.height()) != (native_width as usize, native_height as usize) {
            return Err(Error::WrongSize(format!(
                "frame {k} has wrong size ({}×{}, expected {native_width}×{native_height})",
                frame.width(),
                frame.height(),
            )));
        }
        match scaler.as_mut() {
            Some(r) => {
                if frame.width() != frame.stride() {
                    let mut contig = Vec::with_capacity(frame.width() * frame.height());
                    contig.extend(frame.rows().flat_map(|row| row.iter().copied()));
                    r.resize(&contig, canvas)?;
                } else {
                    r.resize(frame.buf(), canvas)?;
                }
            }
            None => {
                for (dst, src) in canvas.chunks_exact_mut(frame.width()).zip(frame.rows()) {
                    dst.copy_from_slice(src);
                }
            }
        }
        Ok(())
    };

    let mut canvas = vec![RGB8::new(0, 0, 0); usize::from(width) * usize::from(height)];
    capture(0, &mut canvas)?;

    // The palette is trained exactly once; later frames reuse it.
    let quant = NeuQuant::train(&canvas, settings.samplefac());
    let palette = quant.palette();
    let mut enc = Encoder::new(Vec::new(), width, height, &palette, settings.repeat)?;
    let mut indexed = vec![0_u8; canvas.len()];

    for k in 0..total_frames {
        if k > 0 {
            capture(k, &mut canvas)?;
        }
        for (dst, &px) in indexed.iter_mut().zip(&canvas) {
            *dst = quant.lookup(px);
        }
        enc.write_frame(&Frame {
            delay,
            dispose: DisposalMethod::Any,
            transparent: None,
            pixels: &indexed,
        })?;
        if !reporter.step(k as f64 / total_frames as f64) {
            return Err(Error::Aborted);
        }
    }
    enc.finish()
}
