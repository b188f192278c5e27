use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::OnceLock;

use exif::{In, Tag, Value};
use exiftool::ExifTool;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::takeoutsort_core::concurrency::{ConcurrencyManager, OperationClass};
use crate::takeoutsort_core::config::ProcessingConfig;
use crate::takeoutsort_core::media::{ExtractionMethod, MediaCollection, MediaEntity};
use crate::takeoutsort_core::paths::year_folder_year;
use crate::takeoutsort_core::sidecar::{MatchMode, find_sidecar};

/// Canonical EXIF date format.
pub const EXIF_DATE_FORMAT: &[FormatItem] =
    format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

thread_local! {
    static EXIFTOOL: RefCell<Option<ExifTool>> = const { RefCell::new(None) };
}

// MARK: - Sidecar JSON

#[derive(Debug, Deserialize)]
struct TimestampField {
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct GeoData {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawSidecar {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    photo_taken_time: Option<TimestampField>,
    #[serde(default)]
    creation_time: Option<TimestampField>,
    #[serde(default)]
    geo_data: Option<GeoData>,
    #[serde(default)]
    geo_data_exif: Option<GeoData>,
    #[serde(default)]
    google_photos_origin: Option<serde_json::Value>,
}

/// The sidecar fields the pipeline consumes.
#[derive(Debug, Default, Clone)]
pub struct SidecarData {
    pub photo_taken_timestamp: Option<i64>,
    pub creation_timestamp: Option<i64>,
    /// Decimal degrees; `(0.0, 0.0)` entries are dropped during parse.
    pub coordinates: Option<(f64, f64)>,
    pub title: Option<String>,
    pub partner_shared: bool,
}

/// Parse a sidecar JSON file. A malformed file is a non-fatal condition:
/// the caller gets an Err and moves on.
pub fn read_sidecar(path: &Path) -> std::io::Result<SidecarData> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: RawSidecar = serde_json::from_str(&raw)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let coordinates = parsed
        .geo_data_exif
        .as_ref()
        .filter(|g| !(g.latitude == 0.0 && g.longitude == 0.0))
        .or(parsed
            .geo_data
            .as_ref()
            .filter(|g| !(g.latitude == 0.0 && g.longitude == 0.0)))
        .map(|g| (g.latitude, g.longitude));

    let partner_shared = parsed
        .google_photos_origin
        .as_ref()
        .and_then(|origin| origin.get("fromPartnerSharing"))
        .is_some();

    Ok(SidecarData {
        photo_taken_timestamp: parse_timestamp(parsed.photo_taken_time.as_ref()),
        creation_timestamp: parse_timestamp(parsed.creation_time.as_ref()),
        coordinates,
        title: parsed.title,
        partner_shared,
    })
}

fn parse_timestamp(field: Option<&TimestampField>) -> Option<i64> {
    let ts: i64 = field?.timestamp.parse().ok()?;
    if ts == 0 { None } else { Some(ts) }
}

/// Local timezone offset, UTC when indeterminate (common on multithreaded
/// Unix processes).
pub fn local_offset() -> UtcOffset {
    static OFFSET: OnceLock<UtcOffset> = OnceLock::new();
    *OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

/// Unix seconds (UTC) → local wall-clock date-time.
pub fn unix_to_local(ts: i64) -> Option<PrimitiveDateTime> {
    let utc = OffsetDateTime::from_unix_timestamp(ts).ok()?;
    let local = utc.to_offset(local_offset());
    Some(PrimitiveDateTime::new(local.date(), local.time()))
}

// MARK: - Extractors

fn plausible(date: &PrimitiveDateTime) -> bool {
    let current_year = OffsetDateTime::now_utc().year();
    (1900..=current_year + 1).contains(&date.year())
}

/// Extractor 1 (and 4 in tryhard mode): sidecar JSON timestamp.
fn extract_json_date(entity: &MediaEntity, mode: MatchMode) -> Option<(PrimitiveDateTime, SidecarData)> {
    let sidecar_path = find_sidecar(&entity.primary_file.source_path, mode)?;
    sidecar_date(&sidecar_path)
}

/// Timestamp from an already-located sidecar; None when the file is
/// malformed or carries no usable timestamp.
fn sidecar_date(sidecar_path: &Path) -> Option<(PrimitiveDateTime, SidecarData)> {
    let data = match read_sidecar(sidecar_path) {
        Ok(data) => data,
        Err(e) => {
            log::debug!("Malformed sidecar {}: {e}", sidecar_path.display());
            return None;
        }
    };
    let ts = data.photo_taken_timestamp.or(data.creation_timestamp)?;
    let date = unix_to_local(ts)?;
    Some((date, data))
}

/// Extractor 2: EXIF, in-process for content the native reader understands,
/// external tool otherwise.
fn extract_exif_date(path: &Path, exiftool_available: bool) -> Option<PrimitiveDateTime> {
    if let Some(date) = read_exif_date_native(path) {
        return Some(date).filter(plausible);
    }
    if exiftool_available {
        return read_exif_date_external(path).filter(plausible);
    }
    None
}

/// In-process EXIF date read, preference order DateTimeOriginal →
/// DateTimeDigitized (CreateDate) → DateTime.
pub fn read_exif_date_native(path: &Path) -> Option<PrimitiveDateTime> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    for tag in [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime] {
        let field = exif
            .get_field(tag, In::PRIMARY)
            .or_else(|| exif.get_field(tag, In::THUMBNAIL));
        let Some(field) = field else { continue };
        let Value::Ascii(ref values) = field.value else {
            continue;
        };
        let Some(bytes) = values.first() else { continue };
        let Ok(text) = std::str::from_utf8(bytes) else {
            continue;
        };
        if let Ok(date) = PrimitiveDateTime::parse(text.trim(), EXIF_DATE_FORMAT) {
            return Some(date);
        }
    }
    None
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct RawToolDates {
    #[serde(default)]
    date_time_original: Option<String>,
    #[serde(default)]
    create_date: Option<String>,
    #[serde(default)]
    modify_date: Option<String>,
}

/// Single-file date read through a per-thread stay-open exiftool process.
fn read_exif_date_external(path: &Path) -> Option<PrimitiveDateTime> {
    EXIFTOOL.with(|cell| {
        let mut tool = cell.borrow_mut();
        if tool.is_none() {
            *tool = ExifTool::new().ok();
        }
        let tool = tool.as_mut()?;
        let raw: RawToolDates = tool.read_metadata(path, &[]).ok()?;
        [raw.date_time_original, raw.create_date, raw.modify_date]
            .into_iter()
            .flatten()
            .find_map(|text| PrimitiveDateTime::parse(text.trim(), EXIF_DATE_FORMAT).ok())
    })
}

struct GuessPattern {
    regex: Regex,
    has_time: bool,
}

static GUESS_PATTERNS: OnceLock<Vec<GuessPattern>> = OnceLock::new();

fn guess_patterns() -> &'static [GuessPattern] {
    GUESS_PATTERNS.get_or_init(|| {
        let timed = [
            // IMG_20230107_101500, VID_20230107_101500-edited, PXL_...
            r"(?:IMG|VID|PXL|PANO)[-_](\d{4})(\d{2})(\d{2})[-_](\d{2})(\d{2})(\d{2})",
            // Screenshot_20230107-101500 / Screenshot 2023-01-07 10.15.00
            r"Screenshot[-_ ](\d{4})-?(\d{2})-?(\d{2})[-_ ~](\d{2})\.?-?(\d{2})\.?-?(\d{2})",
            // 2023-01-07 10.15.00 / 2023-01-07_10-15-00
            r"(\d{4})-(\d{2})-(\d{2})[-_ ](\d{2})[\.\-:](\d{2})[\.\-:](\d{2})",
            // signal-2023-01-07-10-15-00
            r"signal-(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})",
            // bare 20230107_101500
            r"(\d{4})(\d{2})(\d{2})[-_](\d{2})(\d{2})(\d{2})",
        ];
        let dated = [
            // IMG-20230107-WA0001 and friends (WhatsApp)
            r"(?:IMG|VID)-(\d{4})(\d{2})(\d{2})-WA",
            // 2023-01-07 without a time of day
            r"(?:^|[^\d])(\d{4})-(\d{2})-(\d{2})(?:[^\d]|$)",
        ];

        timed
            .iter()
            .map(|p| GuessPattern { regex: Regex::new(p).unwrap(), has_time: true })
            .chain(dated.iter().map(|p| GuessPattern {
                regex: Regex::new(p).unwrap(),
                has_time: false,
            }))
            .collect()
    })
}

/// Extractor 3: date stamps embedded in the filename, validated
/// calendrically.
pub fn guess_from_filename(name: &str) -> Option<PrimitiveDateTime> {
    for pattern in guess_patterns() {
        let Some(caps) = pattern.regex.captures(name) else {
            continue;
        };
        let year: i32 = caps[1].parse().ok()?;
        let month: u8 = caps[2].parse().ok()?;
        let day: u8 = caps[3].parse().ok()?;
        let month = Month::try_from(month).ok()?;
        let Ok(date) = Date::from_calendar_date(year, month, day) else {
            continue;
        };

        let dt = if pattern.has_time {
            let hour: u8 = caps[4].parse().ok()?;
            let minute: u8 = caps[5].parse().ok()?;
            let second: u8 = caps[6].parse().ok()?;
            let Ok(clock) = Time::from_hms(hour, minute, second) else {
                continue;
            };
            PrimitiveDateTime::new(date, clock)
        } else {
            PrimitiveDateTime::new(date, Time::MIDNIGHT)
        };

        if plausible(&dt) {
            return Some(dt);
        }
    }
    None
}

/// Extractor 5: nearest ancestor `Photos from YYYY` bucket.
fn extract_folder_year(path: &Path, photos_root: &Path) -> Option<PrimitiveDateTime> {
    let mut current = path.parent();
    while let Some(dir) = current {
        let name = dir.file_name()?.to_str()?;
        if let Some(year) = year_folder_year(name) {
            let date = Date::from_calendar_date(year, Month::January, 1).ok()?;
            return Some(PrimitiveDateTime::new(date, Time::MIDNIGHT));
        }
        if dir == photos_root {
            break;
        }
        current = dir.parent();
    }
    None
}

// MARK: - Orchestration

#[derive(Debug, Default)]
pub struct DateExtractionResult {
    pub dates_found: usize,
    pub method_counts: HashMap<ExtractionMethod, usize>,
}

/// Run the extractor chain over every entity, first hit wins.
///
/// Individual extractor failures only advance the chain; nothing here
/// aborts the batch.
pub fn extract_dates(
    collection: &mut MediaCollection,
    config: &ProcessingConfig,
    pools: &ConcurrencyManager,
    photos_root: &Path,
    exiftool_available: bool,
) -> DateExtractionResult {
    let bar = ProgressBar::new(collection.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message("Extracting dates");

    let updates: Vec<(usize, MediaEntity)> = {
        let entities = collection.as_slice();
        pools.install(OperationClass::Cpu, || {
            entities
                .par_iter()
                .enumerate()
                .map(|(index, entity)| {
                    let updated = extract_for_entity(
                        entity,
                        config,
                        photos_root,
                        exiftool_available,
                    );
                    bar.inc(1);
                    (index, updated)
                })
                .collect()
        })
    };

    bar.finish_with_message("Date extraction complete");

    let mut result = DateExtractionResult::default();
    for (_, entity) in &updates {
        *result.method_counts.entry(entity.date_method).or_insert(0) += 1;
        if entity.has_date() {
            result.dates_found += 1;
        }
    }
    collection.apply_updates(updates);
    result
}

fn extract_for_entity(
    entity: &MediaEntity,
    config: &ProcessingConfig,
    photos_root: &Path,
    exiftool_available: bool,
) -> MediaEntity {
    let mut updated = entity.clone();
    let path = entity.primary_file.source_path.clone();
    let filename = entity.primary_file.file_name();

    // 1. JSON sidecar
    match find_sidecar(&path, MatchMode::Basic) {
        Some(sidecar_path) => {
            if let Some((date, data)) = sidecar_date(&sidecar_path) {
                return updated
                    .with_partner_shared(data.partner_shared)
                    .with_date(date, ExtractionMethod::Json);
            }
            // A sidecar exists but is malformed or timestamp-less: the
            // dictionary must not override it; the chain continues.
        }
        None => {
            // No sidecar on disk: the supplemental dictionary is an
            // equivalent source at the same accuracy.
            if let Some(date) = config.file_dates.get(&filename) {
                return updated.with_date(*date, ExtractionMethod::Json);
            }
        }
    }

    // 2. EXIF
    let size_ok = !config.limit_file_size
        || std::fs::metadata(&path).map(|m| m.len() <= 64 * 1024 * 1024).unwrap_or(true);
    if size_ok {
        if let Some(date) = extract_exif_date(&path, exiftool_available) {
            return updated.with_date(date, ExtractionMethod::Exif);
        }
    }

    // 3. filename guess
    if config.guess_from_name {
        if let Some(date) = guess_from_filename(&filename) {
            return updated.with_date(date, ExtractionMethod::Guess);
        }
    }

    // 4. JSON again, aggressively
    if let Some((date, data)) = extract_json_date(entity, MatchMode::Tryhard) {
        return updated
            .with_partner_shared(data.partner_shared)
            .with_date(date, ExtractionMethod::JsonTryhard);
    }

    // 5. folder year
    if let Some(date) = extract_folder_year(&path, photos_root) {
        return updated.with_date(date, ExtractionMethod::FolderYear);
    }

    updated.date_taken = None;
    updated.date_method = ExtractionMethod::None;
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_unix_to_local_utc_fallback() {
        // 2023-06-05 21:20:00 UTC
        let date = unix_to_local(1686000000).unwrap();
        assert_eq!(date.year(), 2023);
        // The exact wall-clock hour depends on the process timezone; the
        // date must land within a day of the UTC value either way.
        assert!(matches!(date.month() as u8, 6));
    }

    #[test]
    fn test_read_sidecar_basic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg.json");
        fs::write(
            &path,
            r#"{
                "title": "a.jpg",
                "photoTakenTime": { "timestamp": "1686000000", "formatted": "x" },
                "geoData": { "latitude": 48.85, "longitude": 2.35, "altitude": 35.0 }
            }"#,
        )
        .unwrap();
        let data = read_sidecar(&path).unwrap();
        assert_eq!(data.photo_taken_timestamp, Some(1686000000));
        assert_eq!(data.coordinates, Some((48.85, 2.35)));
        assert!(!data.partner_shared);
    }

    #[test]
    fn test_read_sidecar_zero_gps_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg.json");
        fs::write(
            &path,
            r#"{ "geoData": { "latitude": 0.0, "longitude": 0.0 } }"#,
        )
        .unwrap();
        let data = read_sidecar(&path).unwrap();
        assert_eq!(data.coordinates, None);
    }

    #[test]
    fn test_read_sidecar_partner_shared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg.json");
        fs::write(
            &path,
            r#"{ "googlePhotosOrigin": { "fromPartnerSharing": {} } }"#,
        )
        .unwrap();
        let data = read_sidecar(&path).unwrap();
        assert!(data.partner_shared);
    }

    #[test]
    fn test_read_sidecar_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(read_sidecar(&path).is_err());
    }

    #[test]
    fn test_read_sidecar_zero_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg.json");
        fs::write(&path, r#"{ "photoTakenTime": { "timestamp": "0" } }"#).unwrap();
        let data = read_sidecar(&path).unwrap();
        assert_eq!(data.photo_taken_timestamp, None);
    }

    #[test]
    fn test_guess_img_pattern() {
        let date = guess_from_filename("IMG_20230107_101500.jpg").unwrap();
        assert_eq!(
            (date.year(), date.month() as u8, date.day()),
            (2023, 1, 7)
        );
        assert_eq!((date.hour(), date.minute(), date.second()), (10, 15, 0));
    }

    #[test]
    fn test_guess_whatsapp_pattern() {
        let date = guess_from_filename("IMG-20210512-WA0003.jpg").unwrap();
        assert_eq!((date.year(), date.month() as u8, date.day()), (2021, 5, 12));
        assert_eq!(date.hour(), 0);
    }

    #[test]
    fn test_guess_dotted_time() {
        let date = guess_from_filename("2019-12-30 21.06.30.jpg").unwrap();
        assert_eq!((date.year(), date.hour(), date.minute()), (2019, 21, 6));
    }

    #[test]
    fn test_guess_screenshot() {
        let date = guess_from_filename("Screenshot_20220301-080910.png").unwrap();
        assert_eq!((date.year(), date.month() as u8), (2022, 3));
    }

    #[test]
    fn test_guess_signal() {
        let date = guess_from_filename("signal-2021-08-02-10-20-30.jpg").unwrap();
        assert_eq!((date.year(), date.second()), (2021, 30));
    }

    #[test]
    fn test_guess_rejects_invalid_calendar() {
        assert!(guess_from_filename("IMG_20230230_101500.jpg").is_none());
        assert!(guess_from_filename("IMG_20231350_101500.jpg").is_none());
    }

    #[test]
    fn test_guess_rejects_implausible_year() {
        assert!(guess_from_filename("IMG_18991231_101500.jpg").is_none());
    }

    #[test]
    fn test_guess_no_pattern() {
        assert!(guess_from_filename("DSC_0042.jpg").is_none());
    }

    #[test]
    fn test_folder_year() {
        let root = PathBuf::from("/takeout/Google Photos");
        let file = root.join("Photos from 2019").join("a.jpg");
        let date = extract_folder_year(&file, &root).unwrap();
        assert_eq!((date.year(), date.month() as u8, date.day()), (2019, 1, 1));
        assert_eq!(date.hour(), 0);
    }

    #[test]
    fn test_folder_year_bounds() {
        let root = PathBuf::from("/takeout/Google Photos");
        let file = root.join("Photos from 2200").join("a.jpg");
        assert!(extract_folder_year(&file, &root).is_none());
    }

    #[test]
    fn test_folder_year_stops_at_root() {
        let root = PathBuf::from("/Photos from 2020/inner");
        let file = root.join("album").join("a.jpg");
        assert!(extract_folder_year(&file, &root).is_none());
    }

    #[test]
    fn test_chain_prefers_json_over_guess() {
        let dir = TempDir::new().unwrap();
        let year_dir = dir.path().join("Photos from 2023");
        fs::create_dir_all(&year_dir).unwrap();
        let media = year_dir.join("IMG_20200101_000000.jpg");
        fs::write(&media, b"not a real jpeg").unwrap();
        fs::write(
            year_dir.join("IMG_20200101_000000.jpg.json"),
            r#"{ "photoTakenTime": { "timestamp": "1686000000" } }"#,
        )
        .unwrap();

        let config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();
        let entity = MediaEntity::new(media);
        let updated = extract_for_entity(&entity, &config, dir.path(), false);
        assert_eq!(updated.date_method, ExtractionMethod::Json);
        assert_eq!(updated.date_taken.unwrap().year(), 2023);
    }

    #[test]
    fn test_chain_guess_then_folder_year() {
        let dir = TempDir::new().unwrap();
        let year_dir = dir.path().join("Photos from 2021");
        fs::create_dir_all(&year_dir).unwrap();
        let guessable = year_dir.join("IMG_20210107_101500.jpg");
        fs::write(&guessable, b"x").unwrap();
        let undated = year_dir.join("scan0001.jpg");
        fs::write(&undated, b"x").unwrap();

        let config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();

        let guessed = extract_for_entity(&MediaEntity::new(guessable), &config, dir.path(), false);
        assert_eq!(guessed.date_method, ExtractionMethod::Guess);

        let fallback = extract_for_entity(&MediaEntity::new(undated), &config, dir.path(), false);
        assert_eq!(fallback.date_method, ExtractionMethod::FolderYear);
        assert_eq!(fallback.date_taken.unwrap().year(), 2021);
    }

    #[test]
    fn test_chain_dictionary_when_no_sidecar() {
        let dir = TempDir::new().unwrap();
        let year_dir = dir.path().join("Photos from 2021");
        fs::create_dir_all(&year_dir).unwrap();
        let media = year_dir.join("scan0001.jpg");
        fs::write(&media, b"x").unwrap();

        let mut config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();
        config.file_dates.insert(
            "scan0001.jpg".to_string(),
            time::macros::datetime!(2015-04-01 12:00:00),
        );

        let updated = extract_for_entity(&MediaEntity::new(media), &config, dir.path(), false);
        assert_eq!(updated.date_method, ExtractionMethod::Json);
        assert_eq!(updated.date_taken.unwrap().year(), 2015);
    }

    #[test]
    fn test_dictionary_ignored_when_sidecar_lacks_timestamp() {
        let dir = TempDir::new().unwrap();
        let year_dir = dir.path().join("Photos from 2021");
        fs::create_dir_all(&year_dir).unwrap();
        let media = year_dir.join("scan0001.jpg");
        fs::write(&media, b"x").unwrap();
        // The sidecar exists but carries no usable timestamp.
        fs::write(year_dir.join("scan0001.jpg.json"), r#"{ "title": "scan0001.jpg" }"#).unwrap();

        let mut config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();
        config.file_dates.insert(
            "scan0001.jpg".to_string(),
            time::macros::datetime!(2015-04-01 12:00:00),
        );

        let updated = extract_for_entity(&MediaEntity::new(media), &config, dir.path(), false);
        // The chain falls through to the year bucket instead of letting the
        // dictionary override a present sidecar.
        assert_eq!(updated.date_method, ExtractionMethod::FolderYear);
        assert_eq!(updated.date_taken.unwrap().year(), 2021);
    }

    #[test]
    fn test_dictionary_ignored_when_sidecar_malformed() {
        let dir = TempDir::new().unwrap();
        let year_dir = dir.path().join("Photos from 2021");
        fs::create_dir_all(&year_dir).unwrap();
        let media = year_dir.join("scan0002.jpg");
        fs::write(&media, b"x").unwrap();
        fs::write(year_dir.join("scan0002.jpg.json"), b"{ not json").unwrap();

        let mut config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();
        config.file_dates.insert(
            "scan0002.jpg".to_string(),
            time::macros::datetime!(2015-04-01 12:00:00),
        );

        let updated = extract_for_entity(&MediaEntity::new(media), &config, dir.path(), false);
        assert_eq!(updated.date_method, ExtractionMethod::FolderYear);
        assert_eq!(updated.date_taken.unwrap().year(), 2021);
    }

    #[test]
    fn test_chain_none_when_nothing_matches() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Album");
        fs::create_dir_all(&album).unwrap();
        let media = album.join("scan0001.jpg");
        fs::write(&media, b"x").unwrap();

        let config =
            ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap();
        let updated = extract_for_entity(&MediaEntity::new(media), &config, dir.path(), false);
        assert_eq!(updated.date_method, ExtractionMethod::None);
        assert!(updated.date_taken.is_none());
    }
}
