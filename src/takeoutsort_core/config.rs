use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use time::PrimitiveDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::takeoutsort_core::error::{Result, TakeoutError};

/// How album membership is materialized in the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumBehavior {
    /// Primaries in ALL_PHOTOS, symlinks in album folders.
    Shortcut,
    /// Primary in its first album folder, symlinks everywhere else.
    ReverseShortcut,
    /// Primaries in ALL_PHOTOS, full copies in album folders.
    DuplicateCopy,
    /// Flat ALL_PHOTOS plus an albums-info.json index at the output root.
    Json,
    /// Flat ALL_PHOTOS, album information discarded.
    Nothing,
}

impl AlbumBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumBehavior::Shortcut => "shortcut",
            AlbumBehavior::ReverseShortcut => "reverse-shortcut",
            AlbumBehavior::DuplicateCopy => "duplicate-copy",
            AlbumBehavior::Json => "json",
            AlbumBehavior::Nothing => "nothing",
        }
    }

    pub fn creates_shortcuts(&self) -> bool {
        matches!(self, AlbumBehavior::Shortcut | AlbumBehavior::ReverseShortcut)
    }

    pub fn creates_duplicates(&self) -> bool {
        matches!(self, AlbumBehavior::DuplicateCopy)
    }

    /// Whether every photo ends up under ALL_PHOTOS regardless of albums.
    pub fn materializes_all_photos(&self) -> bool {
        !matches!(self, AlbumBehavior::ReverseShortcut)
    }
}

impl std::fmt::Display for AlbumBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Date-based subdivision of the ALL_PHOTOS tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateDivision {
    None,
    Year,
    YearMonth,
    YearMonthDay,
}

impl DateDivision {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(DateDivision::None),
            1 => Some(DateDivision::Year),
            2 => Some(DateDivision::YearMonth),
            3 => Some(DateDivision::YearMonthDay),
            _ => None,
        }
    }
}

/// Controls the optional extension-fixing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionFixMode {
    #[default]
    None,
    /// Rename every file whose content disagrees with its extension.
    Standard,
    /// Like Standard but leaves TIFF-family and JPEG files alone.
    Conservative,
    /// Run the fix, then exit without processing anything else.
    Solo,
}

/// Formats accepted for entries in the supplemental date dictionary.
const DICTIONARY_DATE_FORMATS: &[&[FormatItem]] = &[
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
];

/// Immutable configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub album_behavior: AlbumBehavior,
    pub date_division: DateDivision,
    pub write_exif: bool,
    pub guess_from_name: bool,
    pub skip_extras: bool,
    pub transform_pixel_mp: bool,
    pub update_creation_time: bool,
    pub limit_file_size: bool,
    pub divide_partner_shared: bool,
    pub fix_extensions_mode: ExtensionFixMode,
    pub keep_input: bool,
    pub verbose: bool,
    /// Supplemental filename → oldest-known-date mapping.
    pub file_dates: HashMap<String, PrimitiveDateTime>,
}

impl ProcessingConfig {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Result<Self> {
        if input_path.as_os_str().is_empty() {
            return Err(TakeoutError::MissingRequiredPath("input".to_string()));
        }
        if output_path.as_os_str().is_empty() {
            return Err(TakeoutError::MissingRequiredPath("output".to_string()));
        }
        Ok(ProcessingConfig {
            input_path,
            output_path,
            album_behavior: AlbumBehavior::Shortcut,
            date_division: DateDivision::Year,
            write_exif: true,
            guess_from_name: true,
            skip_extras: false,
            transform_pixel_mp: false,
            update_creation_time: false,
            limit_file_size: false,
            divide_partner_shared: false,
            fix_extensions_mode: ExtensionFixMode::None,
            keep_input: false,
            verbose: false,
            file_dates: HashMap::new(),
        })
    }

    /// Load a supplemental date dictionary of shape
    /// `{ "<filename>": { "OldestDate": "<ISO-8601>" }, ... }`.
    ///
    /// Non-object values and unparsable dates are skipped.
    pub fn load_file_dates(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path)?;
        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|e| TakeoutError::Argument(format!("invalid date dictionary: {e}")))?;

        let Value::Object(entries) = parsed else {
            return Err(TakeoutError::Argument(
                "date dictionary root must be an object".to_string(),
            ));
        };

        let mut loaded = 0;
        for (filename, entry) in entries {
            let Value::Object(fields) = entry else {
                continue;
            };
            let Some(Value::String(date_str)) = fields.get("OldestDate") else {
                continue;
            };
            if let Some(date) = parse_dictionary_date(date_str) {
                self.file_dates.insert(filename, date);
                loaded += 1;
            } else {
                log::debug!("Skipping unparsable OldestDate for {filename}: {date_str}");
            }
        }

        Ok(loaded)
    }
}

fn parse_dictionary_date(s: &str) -> Option<PrimitiveDateTime> {
    // Tolerate a trailing offset or fractional seconds by trimming to the
    // date-time core before parsing.
    let core: String = s.chars().take(19).collect();
    DICTIONARY_DATE_FORMATS
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(&core, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_album_behavior_flags() {
        assert!(AlbumBehavior::Shortcut.creates_shortcuts());
        assert!(AlbumBehavior::ReverseShortcut.creates_shortcuts());
        assert!(!AlbumBehavior::DuplicateCopy.creates_shortcuts());
        assert!(AlbumBehavior::DuplicateCopy.creates_duplicates());
        assert!(AlbumBehavior::Shortcut.materializes_all_photos());
        assert!(!AlbumBehavior::ReverseShortcut.materializes_all_photos());
    }

    #[test]
    fn test_date_division_levels() {
        assert_eq!(DateDivision::from_level(0), Some(DateDivision::None));
        assert_eq!(DateDivision::from_level(3), Some(DateDivision::YearMonthDay));
        assert_eq!(DateDivision::from_level(4), None);
    }

    #[test]
    fn test_empty_paths_rejected() {
        let err = ProcessingConfig::new(PathBuf::new(), PathBuf::from("/out")).unwrap_err();
        assert_eq!(err, TakeoutError::MissingRequiredPath("input".to_string()));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_load_file_dates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "IMG_001.jpg": {{ "OldestDate": "2019-03-02T10:11:12" }},
                "IMG_002.jpg": {{ "OldestDate": "not a date" }},
                "IMG_003.jpg": "just a string"
            }}"#
        )
        .unwrap();

        let mut config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();
        let loaded = config.load_file_dates(file.path()).unwrap();
        assert_eq!(loaded, 1);
        let date = config.file_dates.get("IMG_001.jpg").unwrap();
        assert_eq!(date.year(), 2019);
        assert_eq!(date.month() as u8, 3);
    }

    #[test]
    fn test_dictionary_date_with_offset_suffix() {
        let parsed = parse_dictionary_date("2021-07-04T12:00:00+02:00").unwrap();
        assert_eq!(parsed.year(), 2021);
        assert_eq!(parsed.hour(), 12);
    }
}
