use std::io;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// The progress callback returned `false`
        Aborted {
            display("aborted")
        }
        /// The video source could not be opened, decoded, or seeked
        Source(msg: String) {
            display("{}", msg)
        }
        /// The output canvas or scaler could not be set up
        Surface(msg: String) {
            display("{}", msg)
            from(e: resize::Error) -> (e.to_string())
        }
        /// A source handed over a frame that doesn't match its declared dimensions
        WrongSize(msg: String) {
            display("{}", msg)
        }
        Io(err: io::Error) {
            from()
            display("I/O: {}", err)
        }
    }
}

pub type GifResult<T, E = Error> = Result<T, E>;
