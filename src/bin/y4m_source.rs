//! YUV4MPEG2 files as a seekable clip source

use crate::BinResult;
use gifclip::{Error, GifResult, VideoSource};
use imgref::ImgVec;
use rgb::RGB8;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use y4m::Colorspace;
use y4m::Decoder;
use yuv::color::MatrixCoefficients;
use yuv::color::Range;
use yuv::convert::RGBConvert;
use yuv::YUV;

#[derive(Clone, Copy)]
enum Samp {
    S1x1,
    S2x1,
    S2x2,
}

pub struct Y4mSource {
    decoder: Decoder<BufReader<File>>,
    width: usize,
    height: usize,
    native_fps: f64,
    /// Estimated from the file size; y4m streams don't carry a frame count.
    total_frames: u64,
    raw_params: String,
    samp: Samp,
    conv: RGBConvert<u8>,
    /// Index the next `read_frame` call will produce.
    next_index: u64,
    current: Option<ImgVec<RGB8>>,
}

impl Y4mSource {
    pub fn new(path: &Path) -> BinResult<Self> {
        let f = File::open(path)?;
        let file_size = f.metadata()?.len();
        let decoder = Decoder::new(BufReader::new(f))?;

        let width = decoder.get_width();
        let height = decoder.get_height();
        let fps = decoder.get_framerate();
        if fps.num == 0 || fps.den == 0 {
            return Err("Y4M header has no frame rate".into());
        }
        let native_fps = fps.num as f64 / fps.den as f64;

        let raw_params = String::from_utf8_lossy(decoder.get_raw_params()).into_owned();
        let range = raw_params.split_once("COLORRANGE=").map(|(_, r)| {
            if r.starts_with("LIMIT") { Range::Limited } else { Range::Full }
        });
        let sd_or_hd = if height <= 480 && width <= 720 {
            MatrixCoefficients::BT601
        } else {
            MatrixCoefficients::BT709
        };

        let (samp, conv) = match decoder.get_colorspace() {
            Colorspace::Cmono => return Err("Y4M with Cmono is not supported yet".into()),
            Colorspace::Cmono12 => return Err("Y4M with Cmono12 is not supported yet".into()),
            Colorspace::C420 => (Samp::S2x2, RGBConvert::<u8>::new(range.unwrap_or(Range::Limited), MatrixCoefficients::BT601)),
            Colorspace::C420p10 => return Err("Y4M with C420p10 is not supported yet".into()),
            Colorspace::C420p12 => return Err("Y4M with C420p12 is not supported yet".into()),
            Colorspace::C420jpeg => (Samp::S2x2, RGBConvert::<u8>::new(range.unwrap_or(Range::Full), MatrixCoefficients::BT601)),
            Colorspace::C420paldv => (Samp::S2x2, RGBConvert::<u8>::new(range.unwrap_or(Range::Limited), MatrixCoefficients::BT601)),
            Colorspace::C420mpeg2 => (Samp::S2x2, RGBConvert::<u8>::new(range.unwrap_or(Range::Limited), sd_or_hd)),
            Colorspace::C422 => (Samp::S2x1, RGBConvert::<u8>::new(range.unwrap_or(Range::Limited), sd_or_hd)),
            Colorspace::C422p10 => return Err("Y4M with C422p10 is not supported yet".into()),
            Colorspace::C422p12 => return Err("Y4M with C422p12 is not supported yet".into()),
            Colorspace::C444 => (Samp::S1x1, RGBConvert::<u8>::new(range.unwrap_or(Range::Full), MatrixCoefficients::BT709)),
            Colorspace::C444p10 => return Err("Y4M with C444p10 is not supported yet".into()),
            Colorspace::C444p12 => return Err("Y4M with C444p12 is not supported yet".into()),
            _ => return Err(format!("Y4M uses unsupported color mode {raw_params}").into()),
        };
        let conv = conv?;

        // The frame estimate assumes a constant per-frame byte count:
        // planes plus the 6-byte FRAME marker.
        let d = decoder.get_bytes_per_sample();
        let s = match decoder.get_colorspace() {
            Colorspace::C420 | Colorspace::C420jpeg | Colorspace::C420paldv | Colorspace::C420mpeg2 => 6,
            Colorspace::C422 => 8,
            _ => 12,
        };
        let frame_bytes = (width * height * d * s / 4 + 6) as u64;
        let total_frames = file_size.saturating_sub(raw_params.len() as u64) / frame_bytes;

        Ok(Self {
            decoder,
            width,
            height,
            native_fps,
            total_frames,
            raw_params,
            samp,
            conv,
            next_index: 0,
            current: None,
        })
    }
}

impl VideoSource for Y4mSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    fn duration(&self) -> f64 {
        self.total_frames as f64 / self.native_fps
    }

    /// Decodes forward until the frame covering `timestamp`; y4m can't seek
    /// backwards, but the sampler only ever asks for increasing timestamps.
    fn seek_frame(&mut self, timestamp: f64) -> GifResult<ImgVec<RGB8>> {
        let mut target = (timestamp * self.native_fps).floor() as u64;
        if self.total_frames > 0 {
            target = target.min(self.total_frames - 1);
        }
        while self.next_index <= target || self.current.is_none() {
            match self.decoder.read_frame() {
                Ok(frame) => {
                    let rgb = to_rgb(&self.conv, self.samp, self.width, self.height, &self.raw_params, &frame)?;
                    self.current = Some(rgb);
                    self.next_index += 1;
                }
                Err(y4m::Error::EOF) => {
                    // The size estimate can run one frame long; hold the
                    // last decoded frame in that case.
                    if self.current.is_none() {
                        return Err(Error::Source("Y4M stream has no frames".into()));
                    }
                    break;
                }
                Err(e) => return Err(Error::Source(format!("Y4M read failed: {e}"))),
            }
        }
        self.current.clone().ok_or_else(|| Error::Source("Y4M stream has no frames".into()))
    }
}

fn to_rgb(conv: &RGBConvert<u8>, samp: Samp, width: usize, height: usize, raw_params: &str, frame: &y4m::Frame<'_>) -> GifResult<ImgVec<RGB8>> {
    let y = frame.get_y_plane();
    if y.is_empty() {
        return Err(bad_frame(raw_params));
    }
    let u = frame.get_u_plane();
    let v = frame.get_v_plane();
    if v.len() != u.len() {
        return Err(bad_frame(raw_params));
    }

    let mut out = Vec::with_capacity(width * height);
    match samp {
        Samp::S1x1 => {
            if v.len() != y.len() {
                return Err(bad_frame(raw_params));
            }
            let y = y.chunks_exact(width);
            let u = u.chunks_exact(width);
            let v = v.chunks_exact(width);
            if y.len() != v.len() {
                return Err(bad_frame(raw_params));
            }
            for (y, (u, v)) in y.zip(u.zip(v)) {
                out.extend(
                    y.iter().copied().zip(u.iter().copied().zip(v.iter().copied()))
                        .map(|(y, (u, v))| conv.to_rgb(YUV { y, u, v })),
                );
            }
        }
        Samp::S2x1 => {
            let y = y.chunks_exact(width);
            let u = u.chunks_exact((width + 1) / 2);
            let v = v.chunks_exact((width + 1) / 2);
            if y.len() != v.len() {
                return Err(bad_frame(raw_params));
            }
            for (y, (u, v)) in y.zip(u.zip(v)) {
                let u = u.iter().copied().flat_map(|x| [x, x]);
                let v = v.iter().copied().flat_map(|x| [x, x]);
                out.extend(
                    y.iter().copied().zip(u.zip(v))
                        .map(|(y, (u, v))| conv.to_rgb(YUV { y, u, v })),
                );
            }
        }
        Samp::S2x2 => {
            let y = y.chunks_exact(width);
            let u = u.chunks_exact((width + 1) / 2).flat_map(|r| [r, r]);
            let v = v.chunks_exact((width + 1) / 2).flat_map(|r| [r, r]);
            for (y, (u, v)) in y.zip(u.zip(v)) {
                let u = u.iter().copied().flat_map(|x| [x, x]);
                let v = v.iter().copied().flat_map(|x| [x, x]);
                out.extend(
                    y.iter().copied().zip(u.zip(v))
                        .map(|(y, (u, v))| conv.to_rgb(YUV { y, u, v })),
                );
            }
        }
    }
    if out.len() != width * height {
        return Err(bad_frame(raw_params));
    }
    Ok(ImgVec::new(out, width, height))
}

#[cold]
fn bad_frame(mode: &str) -> Error {
    Error::Source(format!("Bad Y4M frame (using {mode})"))
}
