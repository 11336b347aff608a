use gifclip::*;
use imgref::ImgVec;
use rgb::ComponentMap;
use rgb::RGB8;

const RED: RGB8 = RGB8 { r: 200, g: 20, b: 20 };
const BLUE: RGB8 = RGB8 { r: 20, g: 20, b: 200 };

/// Deterministic stand-in for a decoded video file.
struct TestClip {
    width: usize,
    height: usize,
    duration: f64,
    frame_fn: fn(f64, usize, usize) -> Vec<RGB8>,
    /// Every timestamp the converter asked for, in call order.
    seeks: Vec<f64>,
}

impl TestClip {
    fn new(width: usize, height: usize, duration: f64, frame_fn: fn(f64, usize, usize) -> Vec<RGB8>) -> Self {
        Self { width, height, duration, frame_fn, seeks: Vec::new() }
    }

    fn solid(width: usize, height: usize, duration: f64) -> Self {
        Self::new(width, height, duration, |_, w, h| vec![RED; w * h])
    }
}

impl VideoSource for TestClip {
    fn dimensions(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek_frame(&mut self, timestamp: f64) -> GifResult<ImgVec<RGB8>> {
        self.seeks.push(timestamp);
        Ok(ImgVec::new((self.frame_fn)(timestamp, self.width, self.height), self.width, self.height))
    }
}

struct FailingClip {
    good_frames: usize,
    served: usize,
}

impl VideoSource for FailingClip {
    fn dimensions(&self) -> (u32, u32) {
        (8, 8)
    }

    fn duration(&self) -> f64 {
        10.0
    }

    fn seek_frame(&mut self, _timestamp: f64) -> GifResult<ImgVec<RGB8>> {
        if self.served >= self.good_frames {
            return Err(Error::Source("stream cut short".into()));
        }
        self.served += 1;
        Ok(ImgVec::new(vec![RGB8::new(9, 9, 9); 64], 8, 8))
    }
}

struct LyingClip {}

impl VideoSource for LyingClip {
    fn dimensions(&self) -> (u32, u32) {
        (10, 10)
    }

    fn duration(&self) -> f64 {
        0.0
    }

    fn seek_frame(&mut self, _timestamp: f64) -> GifResult<ImgVec<RGB8>> {
        Ok(ImgVec::new(vec![RED; 8 * 8], 8, 8))
    }
}

#[derive(Default)]
struct Recorder {
    ratios: Vec<f64>,
    abort_after: Option<usize>,
}

impl ProgressReporter for Recorder {
    fn step(&mut self, ratio: f64) -> bool {
        self.ratios.push(ratio);
        self.abort_after.map_or(true, |n| self.ratios.len() < n)
    }
}

struct DecodedFrame {
    delay: u16,
    width: u16,
    height: u16,
    pixels: Vec<RGB8>,
}

fn decode(mut gif_data: &[u8]) -> (u16, u16, Vec<DecodedFrame>) {
    let mut gif_opts = gif::DecodeOptions::new();
    gif_opts.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = gif_opts.read_info(&mut gif_data).unwrap();
    let palette = decoder.global_palette().unwrap().to_vec();
    let screen = (decoder.width(), decoder.height());

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        let pixels = frame.buffer.iter().map(|&i| {
            let i = usize::from(i) * 3;
            RGB8::new(palette[i], palette[i + 1], palette[i + 2])
        }).collect();
        frames.push(DecodedFrame {
            delay: frame.delay,
            width: frame.width,
            height: frame.height,
            pixels,
        });
    }
    (screen.0, screen.1, frames)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[track_caller]
fn assert_images_close(a: &[RGB8], b: &[RGB8], max_diff: f64) {
    assert_eq!(a.len(), b.len());
    let diff = a.iter().zip(b.iter()).map(|(a, b)| {
        let a = a.map(|c| i32::from(c));
        let b = b.map(|c| i32::from(c));
        let d = a - b;
        (d.r * d.r + d.g * d.g + d.b * d.b) as u64
    }).sum::<u64>() as f64 / a.len() as f64;
    assert!(diff <= max_diff, "{} diff > {}", diff, max_diff);
}

#[test]
fn solid_clip_keeps_color_timing_and_size() {
    let mut clip = TestClip::solid(10, 10, 2.0);
    let blob = convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();

    let (w, h, frames) = decode(&blob);
    assert_eq!((w, h), (10, 10));
    assert_eq!(frames.len(), 31);
    for frame in &frames {
        assert_eq!(frame.delay, 7);
        assert_eq!((frame.width, frame.height), (10, 10));
        assert_images_close(&frame.pixels, &vec![RED; 100], 0.0);
    }

    // A solid color costs a handful of codes per frame, so the whole
    // animation stays far below the raw 31 * 100 * 3 bytes.
    assert!(blob.len() < 4096, "blob is {} bytes", blob.len());
}

#[test]
fn zero_duration_clip_becomes_a_single_frame() {
    let mut clip = TestClip::solid(4, 4, 0.0);
    let blob = convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();

    assert_eq!(clip.seeks, [0.0]);
    let (_, _, frames) = decode(&blob);
    assert_eq!(frames.len(), 1);
}

#[test]
fn frames_are_sampled_on_a_fixed_grid() {
    let mut clip = TestClip::solid(6, 4, 1.0);
    convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();

    assert_eq!(clip.seeks.len(), 16);
    for (k, &t) in clip.seeks.iter().enumerate() {
        assert!((t - k as f64 / 15.0).abs() < 1e-12);
        assert!(t <= clip.duration + 1e-12);
    }
}

#[test]
fn progress_stays_monotone_and_below_one() {
    let mut clip = TestClip::solid(6, 6, 2.0);
    let mut rec = Recorder::default();
    convert(&mut clip, Settings::default(), &mut rec).unwrap();

    assert_eq!(rec.ratios.len(), 31);
    assert!(rec.ratios.windows(2).all(|w| w[0] < w[1]));
    assert!(rec.ratios.iter().all(|&r| (0.0..1.0).contains(&r)));
}

#[test]
fn returning_false_from_progress_aborts() {
    let mut clip = TestClip::solid(6, 6, 2.0);
    let mut rec = Recorder { ratios: Vec::new(), abort_after: Some(6) };
    let res = convert(&mut clip, Settings::default(), &mut rec);

    assert!(matches!(res, Err(Error::Aborted)));
    assert_eq!(rec.ratios.len(), 6);
}

#[test]
fn source_failure_is_reported_not_swallowed() {
    let mut clip = FailingClip { good_frames: 3, served: 0 };
    let res = convert(&mut clip, Settings::default(), &mut NoProgress {});

    match res {
        Err(Error::Source(msg)) => assert_eq!(msg, "stream cut short"),
        other => panic!("expected a source error, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn mismatched_frame_dimensions_are_rejected() {
    let mut clip = LyingClip {};
    let res = convert(&mut clip, Settings::default(), &mut NoProgress {});

    match res {
        Err(Error::WrongSize(msg)) => assert!(msg.contains("wrong size"), "{}", msg),
        other => panic!("expected a size error, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn wide_clips_are_scaled_down_preserving_aspect() {
    let mut clip = TestClip::new(1000, 500, 0.0, |_, w, h| {
        (0..w * h).map(|i| RGB8::new((i % w) as u8, (i / w) as u8, 100)).collect()
    });
    let blob = convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();

    let (w, h, frames) = decode(&blob);
    assert_eq!((w, h), (480, 240));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pixels.len(), 480 * 240);
}

#[test]
fn small_clips_are_never_upscaled() {
    let mut clip = TestClip::solid(100, 80, 0.0);
    let blob = convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();

    let (w, h, _) = decode(&blob);
    assert_eq!((w, h), (100, 80));
}

#[test]
fn two_tone_frames_survive_quantization() {
    let mut clip = TestClip::new(64, 64, 0.0, |_, w, h| {
        (0..w * h).map(|i| if i % w < w / 2 { RED } else { BLUE }).collect()
    });
    let blob = convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();

    let (_, _, frames) = decode(&blob);
    let expected: Vec<_> = (0..64 * 64).map(|i| if i % 64 < 32 { RED } else { BLUE }).collect();
    assert_images_close(&frames[0].pixels, &expected, 16.0);
}

#[test]
fn loop_forever_is_the_default_and_can_be_turned_off() {
    let mut clip = TestClip::solid(4, 4, 0.0);
    let looping = convert(&mut clip, Settings::default(), &mut NoProgress {}).unwrap();
    assert!(contains(&looping, b"NETSCAPE2.0"));

    let mut clip = TestClip::solid(4, 4, 0.0);
    let one_shot = convert(&mut clip, Settings { repeat: Repeat::Once, ..Settings::default() }, &mut NoProgress {}).unwrap();
    assert!(!contains(&one_shot, b"NETSCAPE2.0"));
}

#[test]
fn delay_follows_the_requested_frame_rate() {
    let mut clip = TestClip::solid(4, 4, 0.2);
    let settings = Settings { fps: 50.0, ..Settings::default() };
    let blob = convert(&mut clip, settings, &mut NoProgress {}).unwrap();

    let (_, _, frames) = decode(&blob);
    assert_eq!(frames.len(), 11);
    assert!(frames.iter().all(|f| f.delay == 2));
}
