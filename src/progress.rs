//! For tracking conversion progress and aborting early

/// A trait that is used to report progress to some consumer.
pub trait ProgressReporter {
    /// Called after each frame has been written, with the fraction of the
    /// clip processed so far. The values are non-decreasing and stay in `[0, 1)`.
    ///
    /// This method may return `false` to abort processing.
    fn step(&mut self, ratio: f64) -> bool;

    /// Conversion is done when `convert()` returns
    fn done(&mut self, _msg: &str) {}
}

/// No-op progress reporter
pub struct NoProgress {}

impl ProgressReporter for NoProgress {
    fn step(&mut self, _ratio: f64) -> bool {
        true
    }
    fn done(&mut self, _msg: &str) {}
}

/// Implement the progress reporter trait for a progress bar,
/// to make it usable for frame processing reporting.
#[cfg(feature = "pbr")]
impl<T> ProgressReporter for pbr::ProgressBar<T> where T: std::io::Write {
    fn step(&mut self, _ratio: f64) -> bool {
        self.inc();
        true
    }

    fn done(&mut self, msg: &str) {
        self.finish_print(msg);
    }
}
