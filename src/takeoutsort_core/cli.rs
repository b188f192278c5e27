use clap::{Parser, ValueEnum};
use simplelog::LevelFilter;
use std::path::PathBuf;

use crate::takeoutsort_core::config::{
    AlbumBehavior, DateDivision, ExtensionFixMode, ProcessingConfig,
};
use crate::takeoutsort_core::error::{Result, TakeoutError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reorganizes a Google Photos Takeout export into a clean chronological tree")]
pub struct Cli {
    /// Input root (the extracted Takeout directory)
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Output root for the reorganized tree
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Album materialization mode
    #[arg(long = "albums", value_enum, default_value_t = AlbumMode::Shortcut)]
    pub albums: AlbumMode,

    /// Date division level: 0 = none, 1 = year, 2 = year/month, 3 = year/month/day
    #[arg(long = "divide-to-dates", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub divide_to_dates: u8,

    /// Do not write dates/GPS back into media files
    #[arg(long = "no-write-exif")]
    pub no_write_exif: bool,

    /// Do not guess dates from filenames
    #[arg(long = "no-guess-from-name")]
    pub no_guess_from_name: bool,

    /// Drop "-edited"-style files after discovery
    #[arg(long = "skip-extras")]
    pub skip_extras: bool,

    /// Rename files whose content disagrees with their extension
    #[arg(long = "fix-extensions", value_enum, default_value_t = FixMode::None)]
    pub fix_extensions: FixMode,

    /// Rename Pixel motion photo .MP/.MV files to .mp4 before moving
    #[arg(long = "transform-pixel-mp")]
    pub transform_pixel_mp: bool,

    /// Set creation time equal to modification time on the output (Windows only)
    #[arg(long = "update-creation-time")]
    pub update_creation_time: bool,

    /// Skip hashing and EXIF work for files over 64 MB
    #[arg(long = "limit-filesize")]
    pub limit_filesize: bool,

    /// Route partner-shared media into a PARTNER_SHARED subtree
    #[arg(long = "divide-partner-shared")]
    pub divide_partner_shared: bool,

    /// Supplemental date dictionary (filename -> OldestDate)
    #[arg(long = "fileDates")]
    pub file_dates: Option<PathBuf>,

    /// Operate on a sibling copy of the input instead of mutating it
    #[arg(long = "keep-input")]
    pub keep_input: bool,

    /// Verbose per-operation output
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Enable file logging to the given path
    #[arg(long = "log")]
    pub log: Option<PathBuf>,

    /// Log level for file logging (debug, info, warn, error)
    #[arg(long, default_value_t = LevelFilter::Debug)]
    pub log_level: LevelFilter,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AlbumMode {
    Shortcut,
    ReverseShortcut,
    DuplicateCopy,
    Json,
    Nothing,
    /// Historical alias for `nothing`.
    Ignore,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FixMode {
    None,
    Standard,
    Conservative,
    Solo,
}

impl Cli {
    /// Resolve parsed arguments into an immutable run configuration.
    ///
    /// The paths are validated here rather than by clap so that a missing
    /// one exits with its own code instead of a generic usage error.
    pub fn into_config(self) -> Result<ProcessingConfig> {
        let input = self
            .input
            .ok_or_else(|| TakeoutError::MissingRequiredPath("--input".to_string()))?;
        let output = self
            .output
            .ok_or_else(|| TakeoutError::MissingRequiredPath("--output".to_string()))?;
        let mut config = ProcessingConfig::new(input, output)?;

        config.album_behavior = match self.albums {
            AlbumMode::Shortcut => AlbumBehavior::Shortcut,
            AlbumMode::ReverseShortcut => AlbumBehavior::ReverseShortcut,
            AlbumMode::DuplicateCopy => AlbumBehavior::DuplicateCopy,
            AlbumMode::Json => AlbumBehavior::Json,
            AlbumMode::Nothing | AlbumMode::Ignore => AlbumBehavior::Nothing,
        };
        config.date_division = DateDivision::from_level(self.divide_to_dates)
            .ok_or_else(|| TakeoutError::Argument("date division out of range".to_string()))?;
        config.write_exif = !self.no_write_exif;
        config.guess_from_name = !self.no_guess_from_name;
        config.skip_extras = self.skip_extras;
        config.transform_pixel_mp = self.transform_pixel_mp;
        config.update_creation_time = self.update_creation_time;
        config.limit_file_size = self.limit_filesize;
        config.divide_partner_shared = self.divide_partner_shared;
        config.fix_extensions_mode = match self.fix_extensions {
            FixMode::None => ExtensionFixMode::None,
            FixMode::Standard => ExtensionFixMode::Standard,
            FixMode::Conservative => ExtensionFixMode::Conservative,
            FixMode::Solo => ExtensionFixMode::Solo,
        };
        config.keep_input = self.keep_input;
        config.verbose = self.verbose;

        if let Some(dict_path) = &self.file_dates {
            let loaded = config.load_file_dates(dict_path)?;
            log::info!("Loaded {} supplemental dates from {}", loaded, dict_path.display());
        }

        Ok(config)
    }
}
