//! Command-line flags layered over a saved session.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fih_core::navigation::SortOrder;
use fih_core::Viewport;
use fih_shared::{
    CameraSettings, DisplayParameters, FocusAlgorithm, FocusOverlay, PixelFormat, StretchBucket,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Saved session to start from: a name in the config directory or a path
    #[arg(long, global = true)]
    pub session: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render one FITS file to PNG
    Render {
        file: PathBuf,

        /// Output PNG (default: input name with .png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// Render the FITS files of a directory
    Browse {
        dir: PathBuf,

        /// Directory receiving the PNGs
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = SortArg::Name)]
        sort: SortArg,

        /// Render every file instead of only the newest
        #[arg(long)]
        all: bool,

        /// Keep watching the directory and render new files as they appear
        #[arg(long)]
        watch: bool,

        /// Stop watching after this many seconds
        #[arg(long)]
        watch_secs: Option<u64>,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// Run the free-running capture loop against the simulated camera
    Capture {
        /// Stop after this many delivered frames
        #[arg(short = 'n', long, default_value = "5")]
        frames: usize,

        /// Directory receiving the rendered PNGs
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Also write every delivered frame as FITS here
        #[arg(long)]
        save_dir: Option<PathBuf>,

        #[arg(long, default_value = "640")]
        width: usize,

        #[arg(long, default_value = "480")]
        height: usize,

        #[command(flatten)]
        camera: CameraArgs,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// Manage saved sessions
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// List stored sessions
    List,
    /// Print a stored session as JSON
    Show { name: String },
    /// Store the current flags as a session
    Save {
        name: String,

        /// File or directory to reopen with this session
        #[arg(long)]
        target: Option<PathBuf>,

        #[command(flatten)]
        camera: CameraArgs,

        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Remove a stored session
    Delete { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Name,
    Modified,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortOrder::Name,
            SortArg::Modified => SortOrder::Modified,
        }
    }
}

fn parse_viewport(s: &str) -> Result<Viewport, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("viewport must be non-empty".to_string());
    }
    Ok(Viewport::new(width, height))
}

fn parse_format(s: &str) -> Result<PixelFormat, String> {
    PixelFormat::ALL
        .into_iter()
        .find(|f| f.to_string().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown pixel format '{s}' (RAW8, RGB24, RAW16 or Y8)"))
}

/// Display flags; unset flags keep the session's value.
#[derive(Args, Clone, Default)]
pub struct DisplayArgs {
    /// Display area as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_viewport, default_value = "1280x960")]
    pub viewport: Option<Viewport>,

    /// Show the frame at full resolution
    #[arg(long)]
    pub no_scale: bool,

    #[arg(long)]
    pub invert: bool,

    /// Percentile stretch: 0, 1, 10, 50 or 100
    #[arg(long)]
    pub stretch: Option<StretchBucket>,

    /// Gamma; 0 disables
    #[arg(long)]
    pub gamma: Option<f64>,

    #[arg(long)]
    pub force_gray: bool,

    /// Stretch luma only
    #[arg(long)]
    pub perceptual: bool,

    /// Star finder: dao or iraf
    #[arg(long)]
    pub finder: Option<FocusAlgorithm>,

    #[arg(long)]
    pub max_stars: Option<usize>,

    #[arg(long)]
    pub fwhm: Option<f64>,

    /// Detection threshold in background sigmas
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Focus overlay: none, sharpness, roundness1, roundness2 or hfr
    #[arg(long)]
    pub overlay: Option<FocusOverlay>,

    /// Print metric values next to the markers
    #[arg(long)]
    pub show_values: bool,
}

impl DisplayArgs {
    pub fn viewport(&self) -> Viewport {
        self.viewport.unwrap_or_default()
    }

    pub fn apply(&self, mut params: DisplayParameters) -> DisplayParameters {
        if self.no_scale {
            params.scale = false;
        }
        params.invert |= self.invert;
        params.force_gray |= self.force_gray;
        params.perceptual_mode |= self.perceptual;
        params.focus_show_values |= self.show_values;
        if let Some(v) = self.stretch {
            params.histogram_stretch = v;
        }
        if let Some(v) = self.gamma {
            params.gamma = v;
        }
        if let Some(v) = self.finder {
            params.focus_algorithm = v;
        }
        if let Some(v) = self.max_stars {
            params.focus_max_stars = v;
        }
        if let Some(v) = self.fwhm {
            params.focus_fwhm = v;
        }
        if let Some(v) = self.threshold {
            params.focus_threshold_sigma = v;
        }
        if let Some(v) = self.overlay {
            params.focus_overlay = v;
        }
        params
    }
}

#[derive(Args, Clone, Default)]
pub struct CameraArgs {
    /// Pixel format: RAW8, RGB24, RAW16 or Y8
    #[arg(long, value_parser = parse_format)]
    pub format: Option<PixelFormat>,

    #[arg(long)]
    pub exposure_us: Option<u64>,

    #[arg(long)]
    pub gain: Option<i32>,

    #[arg(long)]
    pub brightness: Option<i32>,

    #[arg(long)]
    pub cooler: bool,

    #[arg(long)]
    pub target_temp: Option<i32>,

    #[arg(long)]
    pub bin: Option<u32>,
}

impl CameraArgs {
    pub fn apply(&self, mut settings: CameraSettings) -> CameraSettings {
        if let Some(v) = self.format {
            settings.format = v;
        }
        if let Some(v) = self.exposure_us {
            settings.exposure_us = v;
        }
        if let Some(v) = self.gain {
            settings.gain = v;
        }
        if let Some(v) = self.brightness {
            settings.brightness = v;
        }
        settings.cooler |= self.cooler;
        if let Some(v) = self.target_temp {
            settings.target_temp = v;
        }
        if let Some(v) = self.bin {
            settings.bin = v;
        }
        settings
    }
}
