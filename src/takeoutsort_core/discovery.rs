use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::takeoutsort_core::config::ProcessingConfig;
use crate::takeoutsort_core::error::Result;
use crate::takeoutsort_core::media::{MediaCollection, MediaEntity, is_media_file};
use crate::takeoutsort_core::paths::{is_year_folder, repair_mojibake};
use crate::takeoutsort_core::sidecar::has_extra_suffix;

#[derive(Debug, Default)]
pub struct DiscoveryStats {
    pub year_folders: usize,
    pub album_folders: usize,
    pub media_found: usize,
    pub extras_skipped: usize,
}

/// Walk the Google Photos root once and build the media collection.
///
/// Top-level children are either year buckets (`Photos from YYYY`) or album
/// folders; everything else (loose files, empty directories) is ignored.
pub fn discover_media(
    photos_root: &Path,
    config: &ProcessingConfig,
) -> Result<(MediaCollection, DiscoveryStats)> {
    let mut collection = MediaCollection::new();
    let mut stats = DiscoveryStats::default();

    let mut year_dirs = Vec::new();
    let mut album_dirs = Vec::new();
    for entry in std::fs::read_dir(photos_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let dir = entry.path();
        if is_year_folder(&dir) {
            year_dirs.push(dir);
        } else {
            album_dirs.push(dir);
        }
    }
    year_dirs.sort();
    album_dirs.sort();

    let bar = ProgressBar::new((year_dirs.len() + album_dirs.len()) as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message("Discovering media");

    for dir in &year_dirs {
        stats.year_folders += 1;
        for file in media_files_under(dir) {
            if config.skip_extras && file_is_extra(&file) {
                stats.extras_skipped += 1;
                continue;
            }
            collection.add(MediaEntity::new(file));
            stats.media_found += 1;
        }
        bar.inc(1);
    }

    for dir in &album_dirs {
        let files = media_files_under(dir);
        if files.is_empty() {
            // Not an album, just a stray directory.
            bar.inc(1);
            continue;
        }
        stats.album_folders += 1;
        let album_name = album_name_for(dir);
        for file in files {
            if config.skip_extras && file_is_extra(&file) {
                stats.extras_skipped += 1;
                continue;
            }
            collection.add(MediaEntity::new_in_album(
                file,
                album_name.clone(),
                dir.clone(),
            ));
            stats.media_found += 1;
        }
        bar.inc(1);
    }

    bar.finish_with_message("Discovery complete");
    log::info!(
        "Discovered {} media files ({} year folders, {} albums, {} extras skipped)",
        stats.media_found,
        stats.year_folders,
        stats.album_folders,
        stats.extras_skipped
    );

    Ok((collection, stats))
}

fn media_files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_media_file(p))
        .collect();
    files.sort();
    files
}

fn file_is_extra(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(has_extra_suffix)
        .unwrap_or(false)
}

/// Album key: on-disk basename with mojibake repaired, trailing spaces and
/// dots trimmed, re-normalized to NFC.
pub fn album_name_for(dir: &Path) -> String {
    let raw = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let repaired = repair_mojibake(&raw);
    repaired.trim_end_matches([' ', '.']).nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeoutsort_core::config::ProcessingConfig;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> ProcessingConfig {
        ProcessingConfig::new(PathBuf::from("/in"), PathBuf::from("/out")).unwrap()
    }

    fn make_tree(root: &Path) {
        let year = root.join("Photos from 2023");
        fs::create_dir_all(&year).unwrap();
        fs::write(year.join("IMG_001.jpg"), b"a").unwrap();
        fs::write(year.join("IMG_001.jpg.json"), b"{}").unwrap();
        fs::write(year.join("notes.txt"), b"skip me").unwrap();

        let album = root.join("Vacation");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("IMG_001.jpg"), b"a").unwrap();

        fs::create_dir_all(root.join("empty_dir")).unwrap();
    }

    #[test]
    fn test_discover_classifies_folders() {
        let dir = TempDir::new().unwrap();
        make_tree(dir.path());

        let (collection, stats) = discover_media(dir.path(), &test_config()).unwrap();
        assert_eq!(stats.year_folders, 1);
        assert_eq!(stats.album_folders, 1);
        assert_eq!(stats.media_found, 2);
        assert_eq!(collection.len(), 2);

        let year_entity = collection
            .iter()
            .find(|e| e.albums_map.is_empty())
            .expect("year entity");
        assert_eq!(year_entity.primary_file.file_name(), "IMG_001.jpg");

        let album_entity = collection
            .iter()
            .find(|e| !e.albums_map.is_empty())
            .expect("album entity");
        assert!(album_entity.albums_map.contains_key("Vacation"));
    }

    #[test]
    fn test_skip_extras() {
        let dir = TempDir::new().unwrap();
        let year = dir.path().join("Photos from 2022");
        fs::create_dir_all(&year).unwrap();
        fs::write(year.join("photo.jpg"), b"a").unwrap();
        fs::write(year.join("photo-edited.jpg"), b"a").unwrap();

        let mut config = test_config();
        config.skip_extras = true;
        let (collection, stats) = discover_media(dir.path(), &config).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(stats.extras_skipped, 1);
    }

    #[test]
    fn test_album_name_normalization() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Fotos de ");
        fs::create_dir_all(&album).unwrap();
        assert_eq!(album_name_for(&album), "Fotos de");
    }

    #[test]
    fn test_album_name_mojibake() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Cuba¥ol");
        fs::create_dir_all(&album).unwrap();
        assert_eq!(album_name_for(&album), "Cubañol");
    }

    #[test]
    fn test_nested_album_media_counted_once() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Trip");
        fs::create_dir_all(album.join("day1")).unwrap();
        fs::write(album.join("day1").join("a.jpg"), b"a").unwrap();

        let (collection, stats) = discover_media(dir.path(), &test_config()).unwrap();
        assert_eq!(stats.album_folders, 1);
        assert_eq!(collection.len(), 1);
        let entity = collection.get(0).unwrap();
        assert!(entity.albums_map.contains_key("Trip"));
        // Membership points at the album root, not the nested subdirectory.
        assert!(
            entity.albums_map["Trip"]
                .source_directories
                .contains(&album)
        );
    }
}
