use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use time::PrimitiveDateTime;

/// How an entity's capture date was obtained. The ordinal doubles as the
/// accuracy ranking used for duplicate election (lower is better).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionMethod {
    Json,
    Exif,
    Guess,
    JsonTryhard,
    FolderYear,
    None,
}

impl ExtractionMethod {
    pub fn accuracy(&self) -> u8 {
        match self {
            ExtractionMethod::Json => 1,
            ExtractionMethod::Exif => 2,
            ExtractionMethod::Guess => 3,
            ExtractionMethod::JsonTryhard => 4,
            ExtractionMethod::FolderYear => 5,
            ExtractionMethod::None => 99,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Json => "json",
            ExtractionMethod::Exif => "exif",
            ExtractionMethod::Guess => "guess",
            ExtractionMethod::JsonTryhard => "json-tryhard",
            ExtractionMethod::FolderYear => "folder-year",
            ExtractionMethod::None => "none",
        }
    }

    pub fn all() -> &'static [ExtractionMethod] {
        &[
            ExtractionMethod::Json,
            ExtractionMethod::Exif,
            ExtractionMethod::Guess,
            ExtractionMethod::JsonTryhard,
            ExtractionMethod::FolderYear,
            ExtractionMethod::None,
        ]
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A physical file backing a media entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub source_path: PathBuf,
    /// Set once the file has been materialized into the output tree.
    pub target_path: Option<PathBuf>,
    /// True when the materialized target is a symlink, hardlink or junction.
    pub is_link: bool,
}

impl FileReference {
    pub fn new(source_path: PathBuf) -> Self {
        FileReference {
            source_path,
            target_path: None,
            is_link: false,
        }
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Album membership details: every directory this album was seen under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumInfo {
    pub source_directories: BTreeSet<PathBuf>,
}

impl AlbumInfo {
    pub fn from_dir(dir: PathBuf) -> Self {
        AlbumInfo {
            source_directories: BTreeSet::from([dir]),
        }
    }
}

/// A logical photo or video, possibly backed by several physical copies.
#[derive(Debug, Clone)]
pub struct MediaEntity {
    pub primary_file: FileReference,
    pub secondary_files: Vec<FileReference>,
    /// Album name (NFC, sanitized) → membership info.
    pub albums_map: BTreeMap<String, AlbumInfo>,
    pub date_taken: Option<PrimitiveDateTime>,
    pub date_method: ExtractionMethod,
    pub partner_shared: bool,
}

impl MediaEntity {
    pub fn new(primary: PathBuf) -> Self {
        MediaEntity {
            primary_file: FileReference::new(primary),
            secondary_files: Vec::new(),
            albums_map: BTreeMap::new(),
            date_taken: None,
            date_method: ExtractionMethod::None,
            partner_shared: false,
        }
    }

    pub fn new_in_album(primary: PathBuf, album_name: String, album_dir: PathBuf) -> Self {
        let mut entity = Self::new(primary);
        entity
            .albums_map
            .insert(album_name, AlbumInfo::from_dir(album_dir));
        entity
    }

    /// Lower is better; 99 when no date was found.
    pub fn date_accuracy(&self) -> u8 {
        self.date_method.accuracy()
    }

    pub fn has_date(&self) -> bool {
        self.date_taken.is_some() && self.date_method != ExtractionMethod::None
    }

    pub fn with_date(mut self, date: PrimitiveDateTime, method: ExtractionMethod) -> Self {
        self.date_taken = Some(date);
        self.date_method = method;
        self
    }

    pub fn with_partner_shared(mut self, partner_shared: bool) -> Self {
        self.partner_shared = partner_shared;
        self
    }

    /// All physical copies, primary first.
    pub fn all_files(&self) -> impl Iterator<Item = &FileReference> {
        std::iter::once(&self.primary_file).chain(self.secondary_files.iter())
    }

    /// First album name in lexicographic order, if any.
    pub fn first_album(&self) -> Option<&str> {
        self.albums_map.keys().next().map(|s| s.as_str())
    }
}

/// Ordered container of entities, carried between pipeline steps.
///
/// Only the currently running step mutates it; concurrent tasks within a
/// step stage their changes and apply them through `replace` /
/// `apply_updates` on their own index.
#[derive(Debug, Default)]
pub struct MediaCollection {
    entities: Vec<MediaEntity>,
}

impl MediaCollection {
    pub fn new() -> Self {
        MediaCollection { entities: Vec::new() }
    }

    pub fn add(&mut self, entity: MediaEntity) {
        self.entities.push(entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MediaEntity> {
        self.entities.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MediaEntity> {
        self.entities.iter()
    }

    pub fn as_slice(&self) -> &[MediaEntity] {
        &self.entities
    }

    pub fn replace(&mut self, index: usize, entity: MediaEntity) {
        self.entities[index] = entity;
    }

    /// Apply staged per-index replacements produced by a parallel pass.
    pub fn apply_updates(&mut self, updates: Vec<(usize, MediaEntity)>) {
        for (index, entity) in updates {
            self.entities[index] = entity;
        }
    }

    /// Remove the given indices in one pass, preserving order of the rest.
    pub fn remove_indices(&mut self, indices: &BTreeSet<usize>) -> usize {
        if indices.is_empty() {
            return 0;
        }
        let before = self.entities.len();
        let mut i = 0;
        self.entities.retain(|_| {
            let keep = !indices.contains(&i);
            i += 1;
            keep
        });
        before - self.entities.len()
    }

    pub fn snapshot(&self) -> Vec<MediaEntity> {
        self.entities.clone()
    }

    pub fn into_vec(self) -> Vec<MediaEntity> {
        self.entities
    }
}

impl<'a> IntoIterator for &'a MediaCollection {
    type Item = &'a MediaEntity;
    type IntoIter = std::slice::Iter<'a, MediaEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

/// Extensions treated as media even when MIME detection draws a blank
/// (raw formats and Pixel motion-photo fragments).
const EXTRA_MEDIA_EXTENSIONS: &[&str] = &[
    "mp", "mv", "dng", "cr2", "nef", "arw", "heic", "heif", "raw",
];

/// Decide whether a path is a photo or video worth organizing.
pub fn is_media_file(path: &Path) -> bool {
    let mime = mime_guess::from_path(path).first_raw().unwrap_or("");
    if mime.starts_with("image/") || mime.starts_with("video/") {
        return true;
    }
    // MPEG transport streams are commonly misclassified.
    if mime == "model/vnd.mts" {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTRA_MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// MIME type derived from the file's declared extension.
pub fn declared_mime(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

/// MIME type derived from the file's leading bytes. Only formats the
/// pipeline routes on are distinguished.
pub fn sniff_mime(path: &Path) -> Option<&'static str> {
    let mut header = [0u8; 16];
    let mut file = File::open(path).ok()?;
    let read = file.read(&mut header).ok()?;
    sniff_mime_bytes(&header[..read])
}

pub fn sniff_mime_bytes(header: &[u8]) -> Option<&'static str> {
    if header.len() < 4 {
        return None;
    }
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if header.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("image/png");
    }
    if header.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    // Little- and big-endian TIFF; also covers TIFF-based raw formats
    // (CR2, NEF, ARW, DNG).
    if header.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || header.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
    {
        return Some("image/tiff");
    }
    if header.starts_with(b"RIFF") && header.len() >= 12 {
        return match &header[8..12] {
            b"AVI " => Some("video/x-msvideo"),
            b"WEBP" => Some("image/webp"),
            _ => None,
        };
    }
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        return match &header[8..12] {
            b"heic" | b"heix" | b"hevc" | b"mif1" | b"msf1" => Some("image/heic"),
            b"avif" => Some("image/avif"),
            b"qt  " => Some("video/quicktime"),
            _ => Some("video/mp4"),
        };
    }
    // MPEG-TS sync byte on a 188-byte boundary start.
    if header[0] == 0x47 && header.len() >= 8 {
        return Some("video/mp2t");
    }
    None
}

/// TIFF-family content includes raw formats whose declared extension never
/// matches the sniffed `image/tiff`.
pub fn is_tiff_family(mime: &str) -> bool {
    mime == "image/tiff"
}

/// Canonical extension for a sniffed MIME type, for the extension-fix step.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/tiff" => Some("tif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/avif" => Some("avif"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/x-msvideo" => Some("avi"),
        "video/mp2t" => Some("mts"),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_media_by_mime() {
        assert!(is_media_file(Path::new("photo.jpg")));
        assert!(is_media_file(Path::new("photo.PNG")));
        assert!(is_media_file(Path::new("clip.mp4")));
        assert!(is_media_file(Path::new("clip.MOV")));
    }

    #[test]
    fn test_is_media_by_extension_allowlist() {
        assert!(is_media_file(Path::new("motion.MP")));
        assert!(is_media_file(Path::new("motion.mv")));
        assert!(is_media_file(Path::new("raw.dng")));
        assert!(is_media_file(Path::new("raw.CR2")));
        assert!(is_media_file(Path::new("pic.heic")));
    }

    #[test]
    fn test_non_media_rejected() {
        assert!(!is_media_file(Path::new("meta.json")));
        assert!(!is_media_file(Path::new("notes.txt")));
        assert!(!is_media_file(Path::new("archive.zip")));
        assert!(!is_media_file(Path::new("noextension")));
    }

    #[test]
    fn test_sniff_jpeg() {
        assert_eq!(sniff_mime_bytes(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), Some("image/jpeg"));
    }

    #[test]
    fn test_sniff_riff_variants() {
        let mut avi = Vec::from(*b"RIFF\x00\x00\x00\x00AVI ");
        avi.extend_from_slice(&[0; 4]);
        assert_eq!(sniff_mime_bytes(&avi), Some("video/x-msvideo"));

        let mut webp = Vec::from(*b"RIFF\x00\x00\x00\x00WEBP");
        webp.extend_from_slice(&[0; 4]);
        assert_eq!(sniff_mime_bytes(&webp), Some("image/webp"));
    }

    #[test]
    fn test_sniff_iso_bmff() {
        let mut heic = Vec::from(*b"\x00\x00\x00\x18ftypheic");
        heic.extend_from_slice(&[0; 4]);
        assert_eq!(sniff_mime_bytes(&heic), Some("image/heic"));

        let mut mp4 = Vec::from(*b"\x00\x00\x00\x18ftypisom");
        mp4.extend_from_slice(&[0; 4]);
        assert_eq!(sniff_mime_bytes(&mp4), Some("video/mp4"));
    }

    #[test]
    fn test_sniff_tiff() {
        assert_eq!(sniff_mime_bytes(&[0x49, 0x49, 0x2A, 0x00]), Some("image/tiff"));
        assert_eq!(sniff_mime_bytes(&[0x4D, 0x4D, 0x00, 0x2A]), Some("image/tiff"));
    }

    #[test]
    fn test_extraction_method_accuracy_order() {
        let methods = ExtractionMethod::all();
        for pair in methods.windows(2) {
            assert!(pair[0].accuracy() < pair[1].accuracy());
        }
    }

    #[test]
    fn test_entity_date_invariant() {
        let entity = MediaEntity::new(PathBuf::from("a.jpg"));
        assert!(!entity.has_date());
        assert_eq!(entity.date_accuracy(), 99);

        let date = time::macros::datetime!(2023-06-05 21:20:00);
        let entity = entity.with_date(date, ExtractionMethod::Json);
        assert!(entity.has_date());
        assert_eq!(entity.date_accuracy(), 1);
    }

    #[test]
    fn test_collection_remove_indices() {
        let mut collection = MediaCollection::new();
        for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
            collection.add(MediaEntity::new(PathBuf::from(name)));
        }
        let removed = collection.remove_indices(&BTreeSet::from([1, 3]));
        assert_eq!(removed, 2);
        let names: Vec<String> = collection.iter().map(|e| e.primary_file.file_name()).collect();
        assert_eq!(names, vec!["a.jpg", "c.jpg"]);
    }

    #[test]
    fn test_first_album_is_lexicographic() {
        let mut entity = MediaEntity::new(PathBuf::from("a.jpg"));
        entity
            .albums_map
            .insert("Zoo".to_string(), AlbumInfo::from_dir(PathBuf::from("/z")));
        entity
            .albums_map
            .insert("Alps".to_string(), AlbumInfo::from_dir(PathBuf::from("/a")));
        assert_eq!(entity.first_album(), Some("Alps"));
    }
}
