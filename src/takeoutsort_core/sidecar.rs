use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Historical Takeout limit on sidecar basename length. Longer JSON names
/// were cut at this boundary, mangling the `supplemental-metadata` suffix
/// and sometimes the media name itself.
const MAX_SIDECAR_NAME: usize = 51;

const SUPPLEMENTAL: &str = "supplemental-metadata";

/// Known editing suffixes appended by Google Photos, per export language.
pub const EXTRA_FORMATS: &[&str] = &[
    "-edited",
    "-effects",
    "-smile",
    "-mix",
    "-edytowane",
    "-bearbeitet",
    "-bewerkt",
    "-編集済み",
    "-modificato",
    "-modifié",
    "-ha editado",
    "-editado",
    "-editat",
];

/// Extensions that share a sidecar with a `.HEIC` original when exported
/// as live/motion photo companions.
const LIVE_PHOTO_EXTENSIONS: &[&str] = &["mp4", "mov", "jpg", "jpeg", "mp", "mv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Basic,
    Tryhard,
}

static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();

fn numbered_re() -> &'static Regex {
    // name(N).ext — the (N) was inserted before the extension by Takeout's
    // duplicate-name handling.
    NUMBERED_RE.get_or_init(|| Regex::new(r"^(?s)(.*)\((\d+)\)(\.[^.()]+)$").unwrap())
}

static EDGE_SUFFIX_RE: OnceLock<Regex> = OnceLock::new();

fn edge_suffix_re() -> &'static Regex {
    EDGE_SUFFIX_RE.get_or_init(|| Regex::new(r"^(?s)(.+)-[A-Za-z0-9]{1,12}$").unwrap())
}

/// Find the JSON sidecar for a media file, or None.
///
/// Runs an ordered cascade of filename transformations; for each the
/// candidate sidecar names are probed on disk in a fixed order.
pub fn find_sidecar(media_path: &Path, mode: MatchMode) -> Option<PathBuf> {
    let dir = media_path.parent()?;
    let name = media_path.file_name()?.to_str()?;

    for processed in strategies(name, mode) {
        if let Some(found) = probe(dir, &processed) {
            return Some(found);
        }
    }
    None
}

/// The transformation cascade, least to most aggressive.
fn strategies(name: &str, mode: MatchMode) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: Option<String>, out: &mut Vec<String>| {
        if let Some(c) = candidate {
            if !c.is_empty() && !out.contains(&c) {
                out.push(c);
            }
        }
    };

    // S1: identity
    push(Some(name.to_string()), &mut out);

    // S2: shorten when name + ".json" would overflow the sidecar limit
    if name.chars().count() + ".json".len() > MAX_SIDECAR_NAME {
        push(
            Some(name.chars().take(MAX_SIDECAR_NAME - ".json".len()).collect()),
            &mut out,
        );
    }

    // S3: image(11).jpg ↔ image.jpg(11)
    push(bracket_swap(name), &mut out);

    // S4: drop the extension
    push(strip_extension(name).map(str::to_string), &mut out);

    // S5: remove a complete editing suffix (NFC-normalized)
    push(remove_extra_suffix(name), &mut out);

    // S6: motion photo clip.MP -> clip.MP.jpg
    if name.to_lowercase().ends_with(".mp") {
        push(Some(format!("{name}.jpg")), &mut out);
    }

    if mode == MatchMode::Tryhard {
        // S7: live photo companions share the .HEIC sidecar
        push(cross_extension_heic(name), &mut out);

        // S8/S9: truncated editing suffixes, bare and with the extension
        // restored
        for cleaned_stem in partial_extra_removals(name) {
            push(Some(cleaned_stem.clone()), &mut out);
            if let Some(ext) = extension_of(name) {
                push(Some(format!("{cleaned_stem}.{ext}")), &mut out);
            }
        }

        // S10: last-resort removal of a suffix-like trailing run
        push(edge_suffix_removal(name), &mut out);
    }

    out
}

/// Probe candidate sidecar names for one processed media name.
fn probe(dir: &Path, processed: &str) -> Option<PathBuf> {
    // 1. full supplemental-metadata name
    let full = format!("{processed}.{SUPPLEMENTAL}.json");
    if let Some(found) = existing(dir, &full) {
        return Some(found);
    }

    // 2. truncated suffix variants, longest first, once the full name
    //    overflows the historical limit
    if full.chars().count() > MAX_SIDECAR_NAME {
        for cut in (1..SUPPLEMENTAL.len()).rev() {
            let candidate = format!("{processed}.{}.json", &SUPPLEMENTAL[..cut]);
            if candidate.chars().count() > MAX_SIDECAR_NAME {
                continue;
            }
            if let Some(found) = existing(dir, &candidate) {
                return Some(found);
            }
        }
    }

    // 3. numbered variants for name(N).ext sources
    if let Some((base, n)) = split_numbered(processed) {
        for candidate in [
            format!("{base}.{SUPPLEMENTAL}({n}).json"),
            format!("{base}({n}).{SUPPLEMENTAL}.json"),
        ] {
            if let Some(found) = existing(dir, &candidate) {
                return Some(found);
            }
        }
    }

    // 4. plain .json
    if let Some(found) = existing(dir, &format!("{processed}.json")) {
        return Some(found);
    }

    // 5. numbered plain variant: image.jpg(11).json
    if let Some((base, n)) = split_numbered(processed) {
        if let Some(found) = existing(dir, &format!("{base}({n}).json")) {
            return Some(found);
        }
    }

    None
}

fn existing(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    if path.is_file() { Some(path) } else { None }
}

/// `image(11).jpg` → (`image.jpg`, 11)
fn split_numbered(name: &str) -> Option<(String, u32)> {
    let caps = numbered_re().captures(name)?;
    let n: u32 = caps[2].parse().ok()?;
    Some((format!("{}{}", &caps[1], &caps[3]), n))
}

/// `image(11).jpg` → `image.jpg(11)` — Takeout sometimes numbers the JSON
/// after the extension while the media numbers before it.
fn bracket_swap(name: &str) -> Option<String> {
    let caps = numbered_re().captures(name)?;
    Some(format!("{}{}({})", &caps[1], &caps[3], &caps[2]))
}

fn strip_extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(pos) if pos > 0 => Some(&name[..pos]),
        _ => None,
    }
}

fn extension_of(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => Some(&name[pos + 1..]),
        _ => None,
    }
}

/// True when the filename carries a complete editing suffix, e.g.
/// `photo-edited.jpg`. Used by `--skip-extras`.
pub fn has_extra_suffix(name: &str) -> bool {
    let normalized: String = name.nfc().collect();
    let stem = strip_extension(&normalized).unwrap_or(&normalized);
    let stem = strip_trailing_number(stem);
    let lower = stem.to_lowercase();
    EXTRA_FORMATS.iter().any(|extra| lower.ends_with(extra))
}

/// Remove a complete editing suffix (optionally followed by `(N)`) before
/// the extension. Returns the cleaned full filename.
fn remove_extra_suffix(name: &str) -> Option<String> {
    let normalized: String = name.nfc().collect();
    let (stem, ext) = match strip_extension(&normalized) {
        Some(stem) => (stem, extension_of(&normalized)),
        None => (normalized.as_str(), None),
    };
    let without_number = strip_trailing_number(stem);
    let lower = without_number.to_lowercase();

    for extra in EXTRA_FORMATS {
        if lower.ends_with(extra) {
            let keep = without_number.chars().count() - extra.chars().count();
            let base: String = without_number.chars().take(keep).collect();
            if base.is_empty() {
                continue;
            }
            return Some(match ext {
                Some(ext) => format!("{base}.{ext}"),
                None => base,
            });
        }
    }
    None
}

/// Strip one trailing `(N)` group from a stem, if present.
fn strip_trailing_number(stem: &str) -> &str {
    if stem.ends_with(')') {
        if let Some(open) = stem.rfind('(') {
            if stem[open + 1..stem.len() - 1].chars().all(|c| c.is_ascii_digit())
                && open > 0
            {
                return &stem[..open];
            }
        }
    }
    stem
}

/// Remap live/motion companion extensions to `.HEIC`.
fn cross_extension_heic(name: &str) -> Option<String> {
    let ext = extension_of(name)?;
    if LIVE_PHOTO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        let stem = strip_extension(name)?;
        Some(format!("{stem}.HEIC"))
    } else {
        None
    }
}

/// Stems with a truncated editing suffix removed, e.g. `photo-edi` →
/// `photo`. Longest truncations are produced first.
fn partial_extra_removals(name: &str) -> Vec<String> {
    let normalized: String = name.nfc().collect();
    let stem = strip_extension(&normalized).unwrap_or(&normalized);
    let lower = stem.to_lowercase();

    let mut cleaned = Vec::new();
    for extra in EXTRA_FORMATS {
        let extra_chars: Vec<char> = extra.chars().collect();
        for cut in (2..extra_chars.len()).rev() {
            let partial: String = extra_chars[..cut].iter().collect();
            if lower.ends_with(&partial) {
                let keep = stem.chars().count() - cut;
                let base: String = stem.chars().take(keep).collect();
                if !base.is_empty() && !cleaned.contains(&base) {
                    cleaned.push(base);
                }
            }
        }
    }
    cleaned
}

/// When nothing in the dictionary matched, strip one suffix-like trailing
/// run (`-xxxx`) from the stem.
fn edge_suffix_removal(name: &str) -> Option<String> {
    let stem = strip_extension(name).unwrap_or(name);
    let caps = edge_suffix_re().captures(stem)?;
    let base = &caps[1];
    match extension_of(name) {
        Some(ext) => Some(format!("{base}.{ext}")),
        None => Some(base.to_string()),
    }
}
