//! Pluggable clip sources for [`convert`][crate::convert]

use crate::error::GifResult;
use imgref::ImgVec;
use rgb::RGB8;

#[cfg(feature = "png")]
use crate::error::Error;
#[cfg(feature = "png")]
use std::path::{Path, PathBuf};

/// A playable clip the sampler pulls frames from.
///
/// The sampler asks for strictly increasing timestamps, never past
/// [`duration`][VideoSource::duration], and issues the next request only
/// after the previous one returned; a slow source simply slows the
/// conversion down.
pub trait VideoSource {
    /// Native frame size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Clip length in seconds. Zero (or anything non-positive) is treated
    /// as a single still frame.
    fn duration(&self) -> f64;

    /// Blocks until the frame covering `timestamp` seconds has been decoded,
    /// at the native size.
    fn seek_frame(&mut self, timestamp: f64) -> GifResult<ImgVec<RGB8>>;
}

/// A numbered sequence of PNG stills played back at a fixed frame rate.
///
/// Frame `k` of the sequence covers timestamp `k / fps`. The reported
/// duration is nudged half a frame past the last timestamp, so that a
/// sampler running at the same rate lands on every still exactly once
/// even when `(t / fps) * fps` rounds the wrong way.
#[cfg(feature = "png")]
pub struct PngSequence {
    frames: Vec<PathBuf>,
    fps: f64,
    size: (u32, u32),
}

#[cfg(feature = "png")]
impl PngSequence {
    /// Opens the first file to learn the clip's dimensions; the rest are
    /// decoded lazily as they are seeked to.
    pub fn new(frames: Vec<PathBuf>, fps: f64) -> GifResult<Self> {
        let first = match frames.first() {
            Some(path) => decode_png(path)?,
            None => return Err(Error::Source("no frames to encode".into())),
        };
        let size = (first.width() as u32, first.height() as u32);
        Ok(Self { frames, fps, size })
    }
}

#[cfg(feature = "png")]
impl VideoSource for PngSequence {
    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn duration(&self) -> f64 {
        (self.frames.len() as f64 - 0.5) / self.fps
    }

    fn seek_frame(&mut self, timestamp: f64) -> GifResult<ImgVec<RGB8>> {
        let index = ((timestamp * self.fps).round() as usize).min(self.frames.len() - 1);
        decode_png(&self.frames[index])
    }
}

#[cfg(feature = "png")]
fn decode_png(path: &Path) -> GifResult<ImgVec<RGB8>> {
    let image = lodepng::decode24_file(path)
        .map_err(|err| Error::Source(format!("Can't load {}: {}", path.display(), err)))?;
    Ok(ImgVec::new(image.buffer, image.width, image.height))
}

#[cfg(all(test, feature = "png"))]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write_solid(path: &Path, color: RGB8, width: usize, height: usize) {
        let pixels = vec![color; width * height];
        lodepng::encode24_file(path, &pixels, width, height).unwrap();
    }

    #[test]
    fn sequence_timing_and_decoding() {
        let dir = std::env::temp_dir();
        let red = dir.join(format!("gifclip-seq-{}-0.png", std::process::id()));
        let blue = dir.join(format!("gifclip-seq-{}-1.png", std::process::id()));
        write_solid(&red, RGB8::new(255, 0, 0), 4, 3);
        write_solid(&blue, RGB8::new(0, 0, 255), 4, 3);

        let mut seq = PngSequence::new(vec![red.clone(), blue.clone()], 15.0).unwrap();
        assert_eq!(seq.dimensions(), (4, 3));
        // Two stills at 15 fps: a frame and a half worth of clip.
        assert!((seq.duration() - 1.5 / 15.0).abs() < 1e-9);
        // A sampler at the same rate takes exactly len frames from this.
        assert_eq!((seq.duration() * 15.0).floor() as u64 + 1, 2);

        let first = seq.seek_frame(0.0).unwrap();
        assert_eq!(first.buf()[0], RGB8::new(255, 0, 0));
        let second = seq.seek_frame(1.0 / 15.0).unwrap();
        assert_eq!(second.buf()[0], RGB8::new(0, 0, 255));
        // Seeks get clamped to the last frame.
        let clamped = seq.seek_frame(10.0).unwrap();
        assert_eq!(clamped.buf()[0], RGB8::new(0, 0, 255));

        fs::remove_file(red).unwrap();
        fs::remove_file(blue).unwrap();
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(matches!(
            PngSequence::new(Vec::new(), 15.0),
            Err(Error::Source(_))
        ));
    }
}
