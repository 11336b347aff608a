#[macro_use]
extern crate clap;

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::io::Write;

use gifclip::{PngSequence, Repeat, Settings};

mod y4m_source;
use crate::y4m_source::Y4mSource;

use gifclip::{NoProgress, ProgressReporter, VideoSource};

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

use clap::{Arg, ArgAction, Command};

use std::env;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FRAMES_ARG_HELP: &str = "one YUV4MPEG2 (*.y4m) video file, or multiple PNG image files";

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {}", e);
        if let Some(e) = e.source() {
            eprintln!("error: {}", e);
        }
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let matches = Command::new(crate_name!())
                        .version(crate_version!())
                        .about("Converts video clips into looping GIF animations")
                        .arg_required_else_help(true)
                        .allow_negative_numbers(true)
                        .arg(Arg::new("output")
                            .long("output")
                            .short('o')
                            .help("Destination file to write to; \"-\" means stdout")
                            .value_parser(clap::value_parser!(OsString))
                            .value_name("a.gif")
                            .required(true))
                        .arg(Arg::new("fps")
                            .long("fps")
                            .short('r')
                            .help("Frame rate of animation. If using PNG files as \
                                   input, this means the speed, as all frames are \
                                   kept. If video is used, it will be resampled to \
                                   this constant rate by dropping and/or duplicating \
                                   frames")
                            .value_name("num")
                            .default_value("15"))
                        .arg(Arg::new("fast")
                            .long("fast")
                            .action(ArgAction::SetTrue)
                            .help("Faster palette training, but noticeably worse colors"))
                        .arg(Arg::new("width")
                            .long("width")
                            .short('W')
                            .value_name("px")
                            .help("Maximum width.\nBy default anims are limited to 480px"))
                        .arg(Arg::new("nosort")
                            .alias("nosort")
                            .long("no-sort")
                            .action(ArgAction::SetTrue)
                            .help("Use files exactly in the order given, rather than sorted"))
                        .arg(Arg::new("quiet")
                            .long("quiet")
                            .short('q')
                            .action(ArgAction::SetTrue)
                            .help("Do not display anything on standard output/console"))
                        .arg(Arg::new("FILE")
                            .help(FRAMES_ARG_HELP)
                            .num_args(1..)
                            .required(true))
                        .arg(Arg::new("repeat")
                            .long("repeat")
                            .help("Number of times the animation is repeated (-1 none, 0 forever or <value> repetitions")
                            .value_name("num"))
                        .get_matches_from(wild::args_os());

    let mut frames: Vec<&str> = matches.get_many::<String>("FILE").ok_or("Missing files")?.map(|s| s.as_str()).collect();
    if !matches.get_flag("nosort") {
        frames.sort_by(|a, b| natord::compare(a, b));
    }
    let frames: Vec<_> = frames.into_iter().map(PathBuf::from).collect();

    let output_path = DestPath::new(matches.get_one::<OsString>("output").ok_or("Missing output")?);
    let width = parse_opt(matches.get_one::<String>("width").map(|s| s.as_str())).map_err(|_| "Invalid width")?;
    let repeat_int: i32 = parse_opt(matches.get_one::<String>("repeat").map(|s| s.as_str())).map_err(|_| "Invalid repeat count")?.unwrap_or(0);
    let repeat = match repeat_int {
        -1 => Repeat::Once,
        0 => Repeat::Infinite,
        n => Repeat::Finite(u16::try_from(n).map_err(|_| "Invalid repeat count")?),
    };

    let quiet = matches.get_flag("quiet") || output_path == DestPath::Stdout;
    let fps: f64 = matches.get_one::<String>("fps").ok_or("Missing fps")?.parse().map_err(|_| "FPS must be a number")?;

    let settings = Settings {
        max_width: width.unwrap_or(480),
        fps,
        repeat,
        fast: matches.get_flag("fast"),
    };

    if fps > 100.0 {
        return Err("100 fps is maximum".into());
    } else if !quiet && fps > 50.0 {
        eprintln!("warning: web browsers support max 50 fps");
    }

    check_if_paths_exist(&frames)?;

    let mut source: Box<dyn VideoSource> = if frames.len() == 1 {
        match file_type(&frames[0]).unwrap_or(FileType::Other) {
            FileType::Y4M => Box::new(Y4mSource::new(&frames[0])?),
            FileType::PNG | FileType::JPEG => return Err("Only a single image file was given as an input. This is not enough to make an animation.".into()),
            FileType::Other => return Err("Unsupported file format. Only YUV4MPEG2 (*.y4m) video and PNG image sequences can be read.\n\n\
                Use the ffmpeg command to convert your video, e.g.:\n\
                ffmpeg -i video.mp4 -pix_fmt yuv420p clip.y4m".into()),
        }
    } else {
        if let Ok(FileType::JPEG) = file_type(&frames[0]) {
            return Err("JPEG format is unsuitable for conversion to GIF.\n\n\
                JPEG's compression artifacts and color space are very problematic for palette-based\n\
                compression. Please don't use JPEG for making GIF animations. Please re-export\n\
                your animation using the PNG format.".into());
        }
        Box::new(PngSequence::new(frames, fps)?)
    };

    let mut pb;
    let mut nopb = NoProgress {};
    let progress: &mut dyn ProgressReporter = if quiet {
        &mut nopb
    } else {
        let duration = source.duration();
        let total_frames = if duration > 0.0 {
            ((duration * fps).floor() as u64).saturating_add(1)
        } else {
            1
        };
        pb = pbr::ProgressBar::new(total_frames);
        pb.show_speed = false;
        pb.show_percent = false;
        pb.format(" #_. ");
        pb.message("Frame ");
        pb.set_max_refresh_rate(Some(Duration::from_millis(250)));
        &mut pb
    };

    let blob = gifclip::convert(&mut *source, settings, progress)?;

    match output_path {
        DestPath::Path(p) => {
            std::fs::write(p, &blob)
                .map_err(|e| format!("Can't write to {}: {}", p.display(), e))?;
        },
        DestPath::Stdout => {
            let mut out = io::stdout().lock();
            out.write_all(&blob)?;
            out.flush()?;
        },
    };
    progress.done(&format!("gifclip created {}", output_path));

    Ok(())
}

enum FileType {
    PNG, JPEG, Y4M, Other,
}

fn file_type(path: &Path) -> BinResult<FileType> {
    let mut file = File::open(path)?;
    let mut buf = [0; 9];
    file.read_exact(&mut buf)?;

    if buf.starts_with(b"\x89PNG") {
        return Ok(FileType::PNG);
    }
    if buf.starts_with(&[0xFF, 0xD8]) {
        return Ok(FileType::JPEG);
    }
    if &buf == b"YUV4MPEG2" {
        return Ok(FileType::Y4M);
    }
    Ok(FileType::Other)
}

fn check_if_paths_exist(paths: &[PathBuf]) -> BinResult<()> {
    for path in paths {
        if !path.exists() {
            let mut msg = format!("Unable to find the input file: \"{}\"", path.display());
            if path.to_str().map_or(false, |p| p.contains('*')) {
                msg += "\nThe path contains a literal \"*\" character. If you want to select multiple files, don't put the special wildcard characters in quotes.";
            } else if path.is_relative() {
                msg += &format!(" (searched in \"{}\")", env::current_dir()?.display());
            }
            return Err(msg.into());
        }
    }
    Ok(())
}

fn parse_opt<T: ::std::str::FromStr<Err = ::std::num::ParseIntError>>(s: Option<&str>) -> BinResult<Option<T>> {
    match s {
        Some(s) => Ok(Some(s.parse()?)),
        None => Ok(None),
    }
}

#[derive(PartialEq)]
enum DestPath<'a> {
    Path(&'a Path),
    Stdout,
}

impl<'a> DestPath<'a> {
    pub fn new(path: &'a OsStr) -> Self {
        if path == "-" {
            Self::Stdout
        } else {
            Self::Path(Path::new(path))
        }
    }
}

impl fmt::Display for DestPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Path(orig_path) => {
                let abs_path = dunce::canonicalize(orig_path);
                abs_path.as_ref().map(|p| p.as_path()).unwrap_or(orig_path).display().fmt(f)
            },
            Self::Stdout => f.write_str("stdout"),
        }
    }
}
