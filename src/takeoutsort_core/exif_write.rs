use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use exif::{In, Tag};
use indicatif::{ProgressBar, ProgressStyle};
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use rayon::prelude::*;
use time::UtcOffset;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::takeoutsort_core::concurrency::{ConcurrencyManager, OperationClass};
use crate::takeoutsort_core::config::ProcessingConfig;
use crate::takeoutsort_core::dates::{EXIF_DATE_FORMAT, local_offset, read_sidecar};
use crate::takeoutsort_core::exiftool::{ExifToolBatch, PendingWrite, date_tags, gps_tags};
use crate::takeoutsort_core::media::{
    ExtractionMethod, MediaCollection, MediaEntity, declared_mime, is_tiff_family, sniff_mime,
};
use crate::takeoutsort_core::sidecar::{MatchMode, find_sidecar};

const OFFSET_FORMAT: &[FormatItem] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// GPS coordinates in decimal degrees with hemisphere refs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates { latitude, longitude }
    }

    pub fn latitude_ref(&self) -> &'static str {
        if self.latitude < 0.0 { "S" } else { "N" }
    }

    pub fn longitude_ref(&self) -> &'static str {
        if self.longitude < 0.0 { "W" } else { "E" }
    }
}

/// Degrees/minutes/seconds rationals for EXIF GPS fields. Seconds carry a
/// 1/10000 denominator, good to well under 1e-6 degrees.
fn dms_rationals(decimal_degrees: f64) -> Vec<uR64> {
    let absolute = decimal_degrees.abs();
    let degrees = absolute.floor();
    let minutes = ((absolute - degrees) * 60.0).floor();
    let seconds = (absolute - degrees - minutes / 60.0) * 3600.0;

    vec![
        uR64 { nominator: degrees as u32, denominator: 1 },
        uR64 { nominator: minutes as u32, denominator: 1 },
        uR64 {
            nominator: (seconds * 10_000.0).round() as u32,
            denominator: 10_000,
        },
    ]
}

#[derive(Debug, Default)]
pub struct ExifWriteStats {
    pub coordinates_written: usize,
    pub date_times_written: usize,
    pub failures: usize,
    pub mime_mismatches: usize,
    pub native_files: usize,
    pub external_files: usize,
    pub skipped_files: usize,
    pub native_time: Duration,
    pub external_time: Duration,
}

/// Write recovered dates and sidecar GPS back into the media files.
///
/// Content-sniffed JPEGs get an in-process segment rewrite; everything else
/// is batched through exiftool. Per-file errors are counted, never raised.
pub fn write_exif_metadata(
    collection: &MediaCollection,
    config: &ProcessingConfig,
    pools: &ConcurrencyManager,
    exiftool: Option<&Path>,
) -> ExifWriteStats {
    let bar = ProgressBar::new(collection.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message("Writing EXIF");

    let batch = exiftool.map(|tool| Mutex::new(ExifToolBatch::new(tool.to_path_buf())));

    let coordinates_written = AtomicUsize::new(0);
    let date_times_written = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);
    let mime_mismatches = AtomicUsize::new(0);
    let native_files = AtomicUsize::new(0);
    let external_files = AtomicUsize::new(0);
    let skipped_files = AtomicUsize::new(0);
    let native_nanos = AtomicU64::new(0);

    pools.install(OperationClass::Exif, || {
        collection.as_slice().par_iter().for_each(|entity| {
            let outcome = write_for_entity(entity, config, batch.as_ref());
            match outcome {
                WriteOutcome::Native { date, gps, nanos } => {
                    native_files.fetch_add(1, Ordering::Relaxed);
                    native_nanos.fetch_add(nanos, Ordering::Relaxed);
                    if date {
                        date_times_written.fetch_add(1, Ordering::Relaxed);
                    }
                    if gps {
                        coordinates_written.fetch_add(1, Ordering::Relaxed);
                    }
                }
                WriteOutcome::External { date, gps } => {
                    external_files.fetch_add(1, Ordering::Relaxed);
                    if date {
                        date_times_written.fetch_add(1, Ordering::Relaxed);
                    }
                    if gps {
                        coordinates_written.fetch_add(1, Ordering::Relaxed);
                    }
                }
                WriteOutcome::MimeMismatch => {
                    mime_mismatches.fetch_add(1, Ordering::Relaxed);
                    skipped_files.fetch_add(1, Ordering::Relaxed);
                }
                WriteOutcome::Skipped => {
                    skipped_files.fetch_add(1, Ordering::Relaxed);
                }
                WriteOutcome::Failed => {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            bar.inc(1);
        });
    });

    bar.finish_with_message("EXIF writing complete");

    let mut stats = ExifWriteStats {
        coordinates_written: coordinates_written.into_inner(),
        date_times_written: date_times_written.into_inner(),
        failures: failures.into_inner(),
        mime_mismatches: mime_mismatches.into_inner(),
        native_files: native_files.into_inner(),
        external_files: external_files.into_inner(),
        skipped_files: skipped_files.into_inner(),
        native_time: Duration::from_nanos(native_nanos.into_inner()),
        external_time: Duration::ZERO,
    };

    if let Some(batch) = batch {
        let batch_stats = batch.into_inner().unwrap().finish();
        stats.failures += batch_stats.failures;
        stats.external_time = batch_stats.total_batch_time;
    }

    log::info!(
        "EXIF phase: {} native files in {:?}, {} external files in {:?}, {} skipped",
        stats.native_files,
        stats.native_time,
        stats.external_files,
        stats.external_time,
        stats.skipped_files
    );

    stats
}

enum WriteOutcome {
    Native { date: bool, gps: bool, nanos: u64 },
    External { date: bool, gps: bool },
    MimeMismatch,
    Skipped,
    Failed,
}

fn write_for_entity(
    entity: &MediaEntity,
    config: &ProcessingConfig,
    batch: Option<&Mutex<ExifToolBatch>>,
) -> WriteOutcome {
    let path = &entity.primary_file.source_path;

    if config.limit_file_size {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > 64 * 1024 * 1024 {
            return WriteOutcome::Skipped;
        }
    }

    // A reliable EXIF date is never overwritten with our re-derivation.
    let target_date = match entity.date_method {
        ExtractionMethod::Exif | ExtractionMethod::None => None,
        _ => entity.date_taken,
    };

    let target_gps = sidecar_coordinates(entity)
        .filter(|_| !has_embedded_gps(path));

    if target_date.is_none() && target_gps.is_none() {
        return WriteOutcome::Skipped;
    }

    let sniffed = sniff_mime(path);

    if sniffed == Some("image/jpeg") {
        let started = Instant::now();
        match write_native_jpeg(path, target_date.as_ref(), target_gps.as_ref()) {
            Ok(()) => {
                return WriteOutcome::Native {
                    date: target_date.is_some(),
                    gps: target_gps.is_some(),
                    nanos: started.elapsed().as_nanos() as u64,
                };
            }
            Err(e) => {
                log::debug!("Native EXIF write failed for {}: {e}", path.display());
                // Fall through to the external batch with the same tags.
            }
        }
    }

    let Some(batch) = batch else {
        // No external tool and the native path did not apply.
        return if sniffed == Some("image/jpeg") {
            WriteOutcome::Failed
        } else {
            WriteOutcome::Skipped
        };
    };

    // RIFF AVI metadata cannot be rewritten in place by the tool.
    if sniffed == Some("video/x-msvideo") {
        return WriteOutcome::Skipped;
    }

    // Route only files whose declared extension agrees with their content;
    // TIFF-family content (raw formats) is exempt because its extensions
    // never declare image/tiff.
    if let Some(sniffed_mime) = sniffed {
        if !is_tiff_family(sniffed_mime)
            && declared_mime(path).is_some_and(|declared| declared != sniffed_mime)
        {
            return WriteOutcome::MimeMismatch;
        }
    }

    let mut tags = Vec::new();
    if let Some(date) = &target_date {
        let stamp = date.format(EXIF_DATE_FORMAT).unwrap();
        let offset = format_offset(local_offset());
        tags.extend(date_tags(&stamp, &offset));
    }
    if let Some(gps) = &target_gps {
        tags.extend(gps_tags(gps.latitude, gps.longitude));
    }

    batch.lock().unwrap().enqueue(PendingWrite {
        path: path.clone(),
        tags,
    });

    WriteOutcome::External {
        date: target_date.is_some(),
        gps: target_gps.is_some(),
    }
}

/// GPS from the entity's sidecar, if any. `(0.0, 0.0)` never gets here;
/// the sidecar parser already treats it as absent.
fn sidecar_coordinates(entity: &MediaEntity) -> Option<Coordinates> {
    let sidecar = find_sidecar(&entity.primary_file.source_path, MatchMode::Basic)?;
    let data = read_sidecar(&sidecar).ok()?;
    let (latitude, longitude) = data.coordinates?;
    Some(Coordinates::new(latitude, longitude))
}

/// True when the file already carries both GPS coordinates.
fn has_embedded_gps(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
        return false;
    };
    exif.get_field(Tag::GPSLatitude, In::PRIMARY).is_some()
        && exif.get_field(Tag::GPSLongitude, In::PRIMARY).is_some()
}

pub fn format_offset(offset: UtcOffset) -> String {
    offset.format(OFFSET_FORMAT).unwrap()
}

/// In-process APP1 rewrite. Date and GPS land in a single segment rewrite.
pub fn write_native_jpeg(
    path: &Path,
    date: Option<&time::PrimitiveDateTime>,
    gps: Option<&Coordinates>,
) -> std::result::Result<(), String> {
    let mut metadata = Metadata::new_from_path(path).unwrap_or_else(|_| Metadata::new());

    if let Some(date) = date {
        let stamp = date.format(EXIF_DATE_FORMAT).map_err(|e| e.to_string())?;
        let offset = format_offset(local_offset());
        metadata.set_tag(ExifTag::DateTimeOriginal(stamp.clone()));
        metadata.set_tag(ExifTag::CreateDate(stamp.clone()));
        metadata.set_tag(ExifTag::ModifyDate(stamp));
        metadata.set_tag(ExifTag::OffsetTime(offset.clone()));
        metadata.set_tag(ExifTag::OffsetTimeOriginal(offset.clone()));
        metadata.set_tag(ExifTag::OffsetTimeDigitized(offset));
    }

    if let Some(gps) = gps {
        metadata.set_tag(ExifTag::GPSLatitudeRef(gps.latitude_ref().to_string()));
        metadata.set_tag(ExifTag::GPSLatitude(dms_rationals(gps.latitude)));
        metadata.set_tag(ExifTag::GPSLongitudeRef(gps.longitude_ref().to_string()));
        metadata.set_tag(ExifTag::GPSLongitude(dms_rationals(gps.longitude)));
    }

    metadata.write_to_file(path).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeoutsort_core::media::fixtures::TINY_JPEG;
    use crate::takeoutsort_core::media::{ExtractionMethod, MediaCollection, MediaEntity};
    use std::fs;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn dms_to_decimal(parts: &[uR64]) -> f64 {
        let d = parts[0].nominator as f64 / parts[0].denominator as f64;
        let m = parts[1].nominator as f64 / parts[1].denominator as f64;
        let s = parts[2].nominator as f64 / parts[2].denominator as f64;
        d + m / 60.0 + s / 3600.0
    }

    #[test]
    fn test_dms_roundtrip_precision() {
        for value in [0.0, 0.5, 12.345678, 48.858844, 89.999999, 151.215296] {
            let parts = dms_rationals(value);
            let back = dms_to_decimal(&parts);
            assert!(
                (back - value).abs() < 1e-6,
                "value {value} came back as {back}"
            );
        }
    }

    #[test]
    fn test_hemisphere_refs() {
        let sydney = Coordinates::new(-33.8688, 151.2093);
        assert_eq!(sydney.latitude_ref(), "S");
        assert_eq!(sydney.longitude_ref(), "E");

        let vancouver = Coordinates::new(49.2827, -123.1207);
        assert_eq!(vancouver.latitude_ref(), "N");
        assert_eq!(vancouver.longitude_ref(), "W");
    }

    #[test]
    fn test_dms_uses_absolute_value() {
        let negative = dms_rationals(-33.8688);
        let positive = dms_rationals(33.8688);
        assert_eq!(negative, positive);
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(UtcOffset::UTC), "+00:00");
        assert_eq!(format_offset(UtcOffset::from_hms(2, 0, 0).unwrap()), "+02:00");
        assert_eq!(format_offset(UtcOffset::from_hms(-7, -30, 0).unwrap()), "-07:30");
    }

    fn write_config() -> crate::takeoutsort_core::config::ProcessingConfig {
        crate::takeoutsort_core::config::ProcessingConfig::new(
            std::path::PathBuf::from("/in"),
            std::path::PathBuf::from("/out"),
        )
        .unwrap()
    }

    #[test]
    fn test_write_phase_mixed_outcomes() {
        let dir = TempDir::new().unwrap();

        // A healthy JPEG with a guessed date: native write must succeed.
        let good = dir.path().join("good.jpg");
        fs::write(&good, TINY_JPEG).unwrap();

        // A corrupt JPEG header: native write fails, no external tool to
        // catch it, so it counts as a failure while the phase continues.
        let corrupt = dir.path().join("corrupt.jpg");
        fs::write(&corrupt, [0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x02, 0x13, 0x37]).unwrap();

        // Undated, no GPS: nothing to write.
        let untouched = dir.path().join("untouched.jpg");
        fs::write(&untouched, TINY_JPEG).unwrap();

        let mut collection = MediaCollection::new();
        collection.add(
            MediaEntity::new(good.clone())
                .with_date(datetime!(2023-01-07 10:15:00), ExtractionMethod::Guess),
        );
        collection.add(
            MediaEntity::new(corrupt)
                .with_date(datetime!(2023-01-07 10:15:00), ExtractionMethod::Guess),
        );
        collection.add(MediaEntity::new(untouched));

        let pools = ConcurrencyManager::with_limits(1, 2, 1);
        let stats = write_exif_metadata(&collection, &write_config(), &pools, None);

        assert_eq!(stats.date_times_written, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.native_files, 1);
        assert_eq!(stats.skipped_files, 1);
        assert_eq!(stats.coordinates_written, 0);

        // The healthy file now carries the written date.
        let read_back = crate::takeoutsort_core::dates::read_exif_date_native(&good).unwrap();
        assert_eq!(read_back, datetime!(2023-01-07 10:15:00));
    }

    #[test]
    fn test_exif_derived_date_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, TINY_JPEG).unwrap();

        let mut collection = MediaCollection::new();
        collection.add(
            MediaEntity::new(path.clone())
                .with_date(datetime!(2020-05-05 05:05:05), ExtractionMethod::Exif),
        );

        let pools = ConcurrencyManager::with_limits(1, 1, 1);
        let stats = write_exif_metadata(&collection, &write_config(), &pools, None);

        assert_eq!(stats.date_times_written, 0);
        assert_eq!(stats.skipped_files, 1);
        // The file itself is untouched.
        assert_eq!(fs::read(&path).unwrap(), TINY_JPEG);
    }

    #[test]
    fn test_sidecar_gps_written_natively() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("geo.jpg");
        fs::write(&path, TINY_JPEG).unwrap();
        fs::write(
            dir.path().join("geo.jpg.json"),
            r#"{
                "photoTakenTime": { "timestamp": "1686000000" },
                "geoData": { "latitude": 48.858844, "longitude": 2.294351 }
            }"#,
        )
        .unwrap();

        let mut collection = MediaCollection::new();
        collection.add(
            MediaEntity::new(path.clone())
                .with_date(datetime!(2023-06-05 21:20:00), ExtractionMethod::Json),
        );

        let pools = ConcurrencyManager::with_limits(1, 1, 1);
        let stats = write_exif_metadata(&collection, &write_config(), &pools, None);

        assert_eq!(stats.date_times_written, 1);
        assert_eq!(stats.coordinates_written, 1);
        assert_eq!(stats.failures, 0);
        assert!(has_embedded_gps(&path));
    }

    #[test]
    fn test_gps_not_rewritten_when_embedded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("geo.jpg");
        fs::write(&path, TINY_JPEG).unwrap();
        // Embed GPS first.
        write_native_jpeg(&path, None, Some(&Coordinates::new(1.0, 2.0))).unwrap();

        fs::write(
            dir.path().join("geo.jpg.json"),
            r#"{ "geoData": { "latitude": 48.0, "longitude": 2.0 } }"#,
        )
        .unwrap();

        let mut collection = MediaCollection::new();
        collection.add(MediaEntity::new(path.clone()));

        let pools = ConcurrencyManager::with_limits(1, 1, 1);
        let stats = write_exif_metadata(&collection, &write_config(), &pools, None);

        // Already embedded: the sidecar coordinates are not re-applied.
        assert_eq!(stats.coordinates_written, 0);
        assert_eq!(stats.skipped_files, 1);
    }
}
