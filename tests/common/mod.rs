// Shared helpers for integration tests: synthesized Takeout trees.
use std::fs;
use std::path::{Path, PathBuf};

/// A minimal baseline JPEG (1x1, no EXIF); valid enough for content
/// sniffing and for the native EXIF writer to extend.
pub const TINY_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x03, 0x02, 0x02, 0x02, 0x02,
    0x02, 0x03, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x03, 0x04, 0x06, 0x04, 0x04, 0x04, 0x04,
    0x04, 0x08, 0x06, 0x06, 0x05, 0x06, 0x09, 0x08, 0x0A, 0x0A, 0x09, 0x08, 0x09, 0x09, 0x0A,
    0x0C, 0x0F, 0x0C, 0x0A, 0x0B, 0x0E, 0x0B, 0x09, 0x09, 0x0D, 0x11, 0x0D, 0x0E, 0x0F, 0x10,
    0x10, 0x11, 0x10, 0x0A, 0x0C, 0x12, 0x13, 0x12, 0x10, 0x13, 0x0F, 0x10, 0x10, 0x10, 0xFF,
    0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00, 0xFF, 0xC4, 0x00,
    0x1F, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    0xFF, 0xC4, 0x00, 0x14, 0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F,
    0x00, 0x7F, 0xFF, 0xD9,
];

/// Scenario: three files, one album holding a byte-identical duplicate.
///
/// ```text
/// Takeout/Google Photos/Photos from 2023/IMG_001.jpg (+ sidecar, June 2023)
/// Takeout/Google Photos/Photos from 2023/IMG_20230107_101500.jpg
/// Takeout/Google Photos/Vacation/IMG_001.jpg (identical to the year copy)
/// ```
pub fn build_shortcut_scenario(root: &Path) -> PathBuf {
    let photos = root.join("Takeout").join("Google Photos");
    let year = photos.join("Photos from 2023");
    fs::create_dir_all(&year).unwrap();

    fs::write(year.join("IMG_001.jpg"), b"payload-identical").unwrap();
    fs::write(
        year.join("IMG_001.jpg.json"),
        r#"{
            "title": "IMG_001.jpg",
            "photoTakenTime": { "timestamp": "1686000000", "formatted": "Jun 5, 2023" }
        }"#,
    )
    .unwrap();

    fs::write(year.join("IMG_20230107_101500.jpg"), TINY_JPEG).unwrap();

    let album = photos.join("Vacation");
    fs::create_dir_all(&album).unwrap();
    fs::write(album.join("IMG_001.jpg"), b"payload-identical").unwrap();

    root.join("Takeout")
}

/// Scenario: three year-folder photos, one of them also in `Archive/`.
pub fn build_archive_scenario(root: &Path) -> PathBuf {
    let photos = root.join("Takeout").join("Google Photos");
    let year = photos.join("Photos from 2022");
    fs::create_dir_all(&year).unwrap();

    for (name, payload) in [
        ("IMG_A.jpg", b"payload-a".as_slice()),
        ("IMG_B.jpg", b"payload-b".as_slice()),
        ("IMG_C.jpg", b"payload-c".as_slice()),
    ] {
        fs::write(year.join(name), payload).unwrap();
    }

    let archive = photos.join("Archive");
    fs::create_dir_all(&archive).unwrap();
    fs::write(archive.join("IMG_C.jpg"), b"payload-c").unwrap();

    root.join("Takeout")
}
