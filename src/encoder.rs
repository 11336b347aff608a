//! GIF89a container writer: logical screen, global color table, the
//! NETSCAPE2.0 loop extension, and one image block per frame.

use crate::error::GifResult;
use crate::lzw;
use crate::Repeat;
use rgb::RGB8;
use std::io::Write;

const EXTENSION_INTRODUCER: u8 = 0x21;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const APPLICATION_LABEL: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

/// How a decoder should treat the canvas once a frame's delay ran out.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DisposalMethod {
    /// The decoder is not required to take any action.
    #[default]
    Any = 0,
    /// Leave the frame in place.
    Keep = 1,
    /// Restore to the background color.
    Background = 2,
    /// Restore to the previous frame.
    Previous = 3,
}

/// One frame's payload and control data. `pixels` are indices into the
/// global color table, row-major, covering the full canvas.
pub struct Frame<'a> {
    /// Presentation time in 1/100 s.
    pub delay: u16,
    pub dispose: DisposalMethod,
    /// Palette slot to treat as transparent, if any.
    pub transparent: Option<u8>,
    pub pixels: &'a [u8],
}

/// Writes a complete GIF89a stream. The header goes out in [`Encoder::new`],
/// frames in [`Encoder::write_frame`], and the trailer in [`Encoder::finish`];
/// nothing is buffered beyond the writer itself.
pub struct Encoder<W: Write> {
    w: W,
    width: u16,
    height: u16,
    /// Bits needed for a color table index; also the LZW minimum code size.
    color_depth: u8,
}

impl<W: Write> Encoder<W> {
    /// Writes the signature, logical screen descriptor, global color table
    /// (zero-padded to a power-of-two entry count) and, unless `repeat` is
    /// [`Repeat::Once`], the NETSCAPE2.0 loop extension.
    pub fn new(w: W, width: u16, height: u16, palette: &[RGB8], repeat: Repeat) -> GifResult<Self> {
        assert!(!palette.is_empty() && palette.len() <= 256);
        let size = flag_size(palette.len());
        let mut enc = Encoder { w, width, height, color_depth: size + 1 };

        enc.w.write_all(b"GIF89a")?;
        enc.write_u16(width)?;
        enc.write_u16(height)?;
        // Global table present, 8 bits per primary, unsorted.
        enc.w.write_all(&[0x80 | 0x70 | size, 0, 0])?;

        for &c in palette {
            enc.w.write_all(&[c.r, c.g, c.b])?;
        }
        for _ in 0..(2usize << size) - palette.len() {
            enc.w.write_all(&[0, 0, 0])?;
        }

        match repeat {
            Repeat::Once => {}
            Repeat::Infinite => enc.write_netscape(0)?,
            Repeat::Finite(n) => enc.write_netscape(n)?,
        }
        Ok(enc)
    }

    /// Writes the graphic control extension, the image descriptor (always at
    /// the origin, covering the full canvas, no local table) and the
    /// LZW-compressed pixel data.
    pub fn write_frame(&mut self, frame: &Frame<'_>) -> GifResult<()> {
        debug_assert_eq!(
            frame.pixels.len(),
            usize::from(self.width) * usize::from(self.height),
        );
        debug_assert!(frame.pixels.iter().all(|&px| u16::from(px) < 1 << self.color_depth));

        let flags = (frame.dispose as u8) << 2 | u8::from(frame.transparent.is_some());
        self.w.write_all(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, 4, flags])?;
        self.write_u16(frame.delay)?;
        self.w.write_all(&[frame.transparent.unwrap_or(0), 0])?;

        self.w.write_all(&[IMAGE_SEPARATOR, 0, 0, 0, 0])?;
        self.write_u16(self.width)?;
        self.write_u16(self.height)?;
        self.w.write_all(&[0])?;

        self.w.write_all(&lzw::compress(frame.pixels, self.color_depth))?;
        Ok(())
    }

    /// Writes the trailer and hands the writer back.
    pub fn finish(mut self) -> GifResult<W> {
        self.w.write_all(&[TRAILER])?;
        Ok(self.w)
    }

    fn write_netscape(&mut self, loops: u16) -> GifResult<()> {
        self.w.write_all(&[EXTENSION_INTRODUCER, APPLICATION_LABEL, 11])?;
        self.w.write_all(b"NETSCAPE2.0")?;
        self.w.write_all(&[3, 1])?;
        self.write_u16(loops)?;
        self.w.write_all(&[0])?;
        Ok(())
    }

    fn write_u16(&mut self, v: u16) -> GifResult<()> {
        self.w.write_all(&v.to_le_bytes())?;
        Ok(())
    }
}

/// Color table size as the descriptor encodes it: entry count is
/// `2 << flag_size(n)`, index width is `flag_size(n) + 1` bits.
fn flag_size(num_colors: usize) -> u8 {
    match num_colors {
        0..=2 => 0,
        3..=4 => 1,
        5..=8 => 2,
        9..=16 => 3,
        17..=32 => 4,
        33..=64 => 5,
        65..=128 => 6,
        _ => 7,
    }
}
