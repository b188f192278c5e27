use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::takeoutsort_core::error::{Result, TakeoutError};
use crate::takeoutsort_core::media::is_media_file;

/// Year folders are Google's default chronological buckets.
static YEAR_FOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn year_folder_re() -> &'static Regex {
    YEAR_FOLDER_RE.get_or_init(|| Regex::new(r"^Photos from (\d{4})$").unwrap())
}

/// Returns the year if the directory basename is a `Photos from YYYY`
/// bucket. Trailing whitespace is tolerated; implausible years are not.
pub fn year_folder_year(dir_name: &str) -> Option<i32> {
    let trimmed = dir_name.trim_end();
    let captures = year_folder_re().captures(trimmed)?;
    let year: i32 = captures[1].parse().ok()?;
    let current_year = time::OffsetDateTime::now_utc().year();
    if (1900..=current_year + 1).contains(&year) {
        Some(year)
    } else {
        None
    }
}

pub fn is_year_folder(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .and_then(year_folder_year)
        .is_some()
}

/// Locate the Google Photos root under an arbitrary input path.
///
/// Accepted shapes:
///   - a parent directory containing a `Takeout` subfolder,
///   - the `Takeout` folder itself,
///   - a directory that already contains year folders or album folders
///     with media (i.e. the Google Photos folder, in any language).
pub fn resolve_google_photos_root(input: &Path) -> Result<PathBuf> {
    if !input.exists() {
        return Err(TakeoutError::InputNotFound(input.to_path_buf()));
    }

    if dir_name_is_takeout(input) {
        return descend_takeout(input);
    }

    for child in subdirectories(input)? {
        if dir_name_is_takeout(&child) {
            return descend_takeout(&child);
        }
    }

    // Year-folder evidence beats the albums-with-media heuristic: a wrapper
    // directory around "Google Photos" must not itself pass as the root.
    if has_year_folder_children(input) {
        return Ok(input.to_path_buf());
    }
    for child in subdirectories(input)? {
        if has_year_folder_children(&child) {
            return Ok(child);
        }
    }

    // Albums-only exports: the input holds album folders with media.
    if has_album_with_media(input) {
        return Ok(input.to_path_buf());
    }

    Err(TakeoutError::PathResolutionFailed(input.to_path_buf()))
}

fn dir_name_is_takeout(dir: &Path) -> bool {
    dir.is_dir()
        && dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.trim_end().eq_ignore_ascii_case("takeout"))
            .unwrap_or(false)
}

/// Inside a Takeout folder the Google Photos directory is localized
/// ("Google Photos", "Google Fotos", ...). With a single subdirectory there
/// is nothing to disambiguate.
fn descend_takeout(takeout: &Path) -> Result<PathBuf> {
    let children = subdirectories(takeout)?;
    if children.len() == 1 {
        return Ok(children.into_iter().next().unwrap());
    }
    for child in children {
        if looks_like_photos_root(&child) {
            return Ok(child);
        }
    }
    Err(TakeoutError::PathResolutionFailed(takeout.to_path_buf()))
}

fn looks_like_photos_root(dir: &Path) -> bool {
    has_year_folder_children(dir) || has_album_with_media(dir)
}

fn has_year_folder_children(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    subdirectories(dir)
        .map(|children| children.iter().any(|child| is_year_folder(child)))
        .unwrap_or(false)
}

fn has_album_with_media(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    subdirectories(dir)
        .map(|children| children.iter().any(|child| directory_has_media(child)))
        .unwrap_or(false)
}

fn directory_has_media(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && is_media_file(e.path()))
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Right-trim spaces and dots from every non-root path segment.
///
/// Takeout exports produce directory names with trailing spaces
/// (e.g. `"Fotos de "`) which are not writable on Windows and would split
/// one album into two on other platforms.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_string_lossy();
                let trimmed = segment.trim_end_matches([' ', '.']);
                if trimmed.is_empty() {
                    out.push("_");
                } else {
                    out.push(trimmed);
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Windows reserved device names; a file named `CON.jpg` is unwritable.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a single file or directory name for writing on the current
/// platform. Unicode is preserved.
pub fn sanitize_filename(name: &str) -> Result<String> {
    sanitize_filename_for(name, cfg!(windows))
}

pub fn sanitize_filename_for(name: &str, windows: bool) -> Result<String> {
    let mut sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if (c as u32) < 0x20 => '_',
            c => c,
        })
        .collect();

    if windows {
        sanitized = sanitized.trim_end_matches([' ', '.']).to_string();

        let (stem, ext) = split_name(&sanitized);
        if WINDOWS_DEVICE_NAMES
            .iter()
            .any(|dev| stem.eq_ignore_ascii_case(dev))
        {
            sanitized = match ext {
                Some(ext) => format!("{stem}_file.{ext}"),
                None => format!("{stem}_file"),
            };
        }
    }

    if sanitized.is_empty() {
        return Err(TakeoutError::InvalidPath(name.to_string()));
    }
    Ok(sanitized)
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

/// Repair names damaged by a non-UTF-8 ZIP extraction.
///
/// Three passes, each conditional on its marker characters:
///   1. `¥` (U+00A5) stands in for Ñ/ñ; pick case from the neighbors.
///   2. `Ã`/`Â` indicate UTF-8 bytes decoded as Latin-1; reverse the
///      decode and keep the result only if the markers disappear.
///   3. A handful of CP437 accents decoded as Latin-1.
pub fn repair_mojibake(name: &str) -> String {
    let mut repaired = name.to_string();

    if repaired.contains('\u{00A5}') {
        repaired = repair_yen_sign(&repaired);
    }

    if repaired.contains('Ã') || repaired.contains('Â') {
        if let Some(redecoded) = latin1_to_utf8(&repaired) {
            if !redecoded.contains('Ã') && !redecoded.contains('Â') {
                repaired = redecoded;
            }
        }
    }

    if repaired
        .chars()
        .any(|c| matches!(c, '\u{00A0}' | '\u{00A2}' | '\u{00A3}' | '\u{00A4}'))
    {
        repaired = repaired
            .chars()
            .map(|c| match c {
                '\u{00A0}' => 'á',
                '\u{00A2}' => 'ó',
                '\u{00A3}' => 'ú',
                '\u{00A4}' => 'ñ',
                '\u{00A5}' => 'Ñ',
                c => c,
            })
            .collect();
    }

    repaired
}

fn repair_yen_sign(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    for (i, &c) in chars.iter().enumerate() {
        if c != '\u{00A5}' {
            out.push(c);
            continue;
        }
        let neighbor_lowercase = chars[..i]
            .iter()
            .rev()
            .chain(chars[i + 1..].iter())
            .find(|n| n.is_alphabetic())
            .map(|n| n.is_lowercase())
            .unwrap_or(true);
        out.push(if neighbor_lowercase { 'ñ' } else { 'Ñ' });
    }
    out
}

/// Re-encode a string as Latin-1 bytes and decode those bytes as UTF-8.
/// Returns None when any character is outside Latin-1 or the bytes are not
/// valid UTF-8.
fn latin1_to_utf8(s: &str) -> Option<String> {
    let bytes: Option<Vec<u8>> = s
        .chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF { Some(code as u8) } else { None }
        })
        .collect();
    String::from_utf8(bytes?).ok()
}

/// The `n`-th ` (n)` variant of a desired path, inserted before the
/// extension.
pub fn numbered_variant(desired: &Path, n: u32) -> PathBuf {
    let parent = desired.parent().unwrap_or_else(|| Path::new(""));
    let name = desired
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (stem, ext) = split_name(&name);
    let candidate_name = match ext {
        Some(ext) => format!("{stem} ({n}).{ext}"),
        None => format!("{stem} ({n})"),
    };
    parent.join(candidate_name)
}

/// Find a free path by appending ` (n)` before the extension.
pub fn unique_path(desired: &Path) -> PathBuf {
    if !desired.exists() {
        return desired.to_path_buf();
    }
    for n in 1u32.. {
        let candidate = numbered_variant(desired, n);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}
