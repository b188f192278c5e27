use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};

use crate::takeoutsort_core::concurrency::{ConcurrencyManager, OperationClass};
use crate::takeoutsort_core::config::AlbumBehavior;
use crate::takeoutsort_core::fileops;
use crate::takeoutsort_core::media::{MediaCollection, MediaEntity};
use crate::takeoutsort_core::paths::{numbered_variant, sanitize_filename};
use crate::takeoutsort_core::target_paths::{MovingContext, target_directory};

pub const ALBUMS_INFO_FILE: &str = "albums-info.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOperation {
    Move,
    Copy,
    CreateSymlink,
    CreateReverseSymlink,
    CreateJsonReference,
    Delete,
}

impl MoveOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveOperation::Move => "move",
            MoveOperation::Copy => "copy",
            MoveOperation::CreateSymlink => "symlink",
            MoveOperation::CreateReverseSymlink => "reverse-symlink",
            MoveOperation::CreateJsonReference => "json-reference",
            MoveOperation::Delete => "delete",
        }
    }
}

/// One materialization action, successful or not.
#[derive(Debug, Clone)]
pub struct MoveOperationResult {
    pub operation: MoveOperation,
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub album: Option<String>,
    pub success: bool,
    pub message: Option<String>,
}

impl MoveOperationResult {
    fn ok(operation: MoveOperation, source: PathBuf, target: Option<PathBuf>) -> Self {
        MoveOperationResult {
            operation,
            source,
            target,
            album: None,
            success: true,
            message: None,
        }
    }

    fn failed(operation: MoveOperation, source: PathBuf, message: String) -> Self {
        MoveOperationResult {
            operation,
            source,
            target: None,
            album: None,
            success: false,
            message: Some(message),
        }
    }

    fn with_album(mut self, album: &str) -> Self {
        self.album = Some(album.to_string());
        self
    }
}

/// Allocates collision-free target paths across concurrent workers.
///
/// A claimed path is reserved for its caller even before the file lands on
/// disk; an already-materialized target is never renamed.
pub struct TargetClaims {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl TargetClaims {
    pub fn new() -> Self {
        TargetClaims {
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn claim(&self, desired: &Path) -> PathBuf {
        let mut claimed = self.claimed.lock().unwrap();
        let mut candidate = desired.to_path_buf();
        let mut n = 0;
        while candidate.exists() || claimed.contains(&candidate) {
            n += 1;
            candidate = numbered_variant(desired, n);
        }
        claimed.insert(candidate.clone());
        candidate
    }
}

impl Default for TargetClaims {
    fn default() -> Self {
        Self::new()
    }
}

/// An album-materialization strategy: how one entity's physical copies and
/// album memberships map onto the output tree.
pub trait MovingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The primary's MOVE result always precedes derivative COPY/LINK
    /// results within the returned stream.
    fn process(
        &self,
        entity: &MediaEntity,
        context: &MovingContext,
        claims: &TargetClaims,
    ) -> (MediaEntity, Vec<MoveOperationResult>);

    /// Emitted once after every entity was processed.
    fn finalize(&self, _context: &MovingContext) -> Vec<MoveOperationResult> {
        Vec::new()
    }
}

pub fn strategy_for(behavior: AlbumBehavior) -> Box<dyn MovingStrategy> {
    match behavior {
        AlbumBehavior::Shortcut => Box::new(ShortcutStrategy),
        AlbumBehavior::ReverseShortcut => Box::new(ReverseShortcutStrategy),
        AlbumBehavior::DuplicateCopy => Box::new(DuplicateCopyStrategy),
        AlbumBehavior::Json => Box::new(JsonIndexStrategy::new()),
        AlbumBehavior::Nothing => Box::new(FlatStrategy),
    }
}

// MARK: - Shared helpers

fn move_primary_to(
    entity: &mut MediaEntity,
    dir: &Path,
    claims: &TargetClaims,
) -> MoveOperationResult {
    let source = entity.primary_file.source_path.clone();
    let name = match sanitize_filename(&entity.primary_file.file_name()) {
        Ok(name) => name,
        Err(e) => return MoveOperationResult::failed(MoveOperation::Move, source, e.to_string()),
    };
    let target = claims.claim(&dir.join(name));
    match fileops::move_file(&source, &target) {
        Ok(()) => {
            entity.primary_file.target_path = Some(target.clone());
            MoveOperationResult::ok(MoveOperation::Move, source, Some(target))
        }
        Err(e) => MoveOperationResult::failed(MoveOperation::Move, source, e.to_string()),
    }
}

fn link_into(
    moved_primary: &Path,
    dir: &Path,
    operation: MoveOperation,
    claims: &TargetClaims,
) -> MoveOperationResult {
    let name = moved_primary
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let link = claims.claim(&dir.join(name));
    match fileops::create_link(moved_primary, &link) {
        Ok(()) => MoveOperationResult::ok(operation, moved_primary.to_path_buf(), Some(link)),
        Err(e) => {
            MoveOperationResult::failed(operation, moved_primary.to_path_buf(), e.to_string())
        }
    }
}

fn copy_into(moved_primary: &Path, dir: &Path, claims: &TargetClaims) -> MoveOperationResult {
    let name = moved_primary
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let target = claims.claim(&dir.join(name));
    match fileops::copy_file(moved_primary, &target) {
        Ok(()) => {
            MoveOperationResult::ok(MoveOperation::Copy, moved_primary.to_path_buf(), Some(target))
        }
        Err(e) => {
            MoveOperationResult::failed(MoveOperation::Copy, moved_primary.to_path_buf(), e.to_string())
        }
    }
}

/// Secondary copies carry no information the primary does not; they are
/// removed from the input tree.
fn delete_secondaries(entity: &MediaEntity) -> Vec<MoveOperationResult> {
    entity
        .secondary_files
        .iter()
        .map(|file| {
            let source = file.source_path.clone();
            match fileops::delete_file(&source) {
                Ok(()) => MoveOperationResult::ok(MoveOperation::Delete, source, None),
                Err(e) => MoveOperationResult::failed(MoveOperation::Delete, source, e.to_string()),
            }
        })
        .collect()
}

fn album_directory(
    album: &str,
    entity: &MediaEntity,
    context: &MovingContext,
) -> Result<PathBuf, String> {
    target_directory(
        Some(album),
        entity.date_taken.as_ref(),
        entity.partner_shared,
        context,
    )
    .map_err(|e| e.to_string())
}

fn all_photos_directory(entity: &MediaEntity, context: &MovingContext) -> Result<PathBuf, String> {
    target_directory(
        None,
        entity.date_taken.as_ref(),
        entity.partner_shared,
        context,
    )
    .map_err(|e| e.to_string())
}

// MARK: - Strategies

/// Primaries live in ALL_PHOTOS; albums hold symlinks to them.
struct ShortcutStrategy;

impl MovingStrategy for ShortcutStrategy {
    fn name(&self) -> &'static str {
        "shortcut"
    }

    fn process(
        &self,
        entity: &MediaEntity,
        context: &MovingContext,
        claims: &TargetClaims,
    ) -> (MediaEntity, Vec<MoveOperationResult>) {
        let mut updated = entity.clone();
        let mut results = Vec::new();

        let dir = match all_photos_directory(entity, context) {
            Ok(dir) => dir,
            Err(message) => {
                results.push(MoveOperationResult::failed(
                    MoveOperation::Move,
                    entity.primary_file.source_path.clone(),
                    message,
                ));
                return (updated, results);
            }
        };

        let moved = move_primary_to(&mut updated, &dir, claims);
        let moved_ok = moved.success;
        results.push(moved);

        if moved_ok {
            let target = updated.primary_file.target_path.clone().unwrap();
            for album in updated.albums_map.keys() {
                match album_directory(album, entity, context) {
                    Ok(album_dir) => results.push(
                        link_into(&target, &album_dir, MoveOperation::CreateSymlink, claims)
                            .with_album(album),
                    ),
                    Err(message) => results.push(
                        MoveOperationResult::failed(
                            MoveOperation::CreateSymlink,
                            target.clone(),
                            message,
                        )
                        .with_album(album),
                    ),
                }
            }
        }

        results.extend(delete_secondaries(&updated));
        (updated, results)
    }
}

/// Primaries live in their first album; ALL_PHOTOS and the remaining
/// albums hold symlinks.
struct ReverseShortcutStrategy;

impl MovingStrategy for ReverseShortcutStrategy {
    fn name(&self) -> &'static str {
        "reverse-shortcut"
    }

    fn process(
        &self,
        entity: &MediaEntity,
        context: &MovingContext,
        claims: &TargetClaims,
    ) -> (MediaEntity, Vec<MoveOperationResult>) {
        let mut updated = entity.clone();
        let mut results = Vec::new();

        // Deterministic home: the lexicographically smallest album name.
        let home_album = entity.first_album().map(str::to_string);

        let home_dir = match &home_album {
            Some(album) => album_directory(album, entity, context),
            None => all_photos_directory(entity, context),
        };
        let home_dir = match home_dir {
            Ok(dir) => dir,
            Err(message) => {
                results.push(MoveOperationResult::failed(
                    MoveOperation::Move,
                    entity.primary_file.source_path.clone(),
                    message,
                ));
                return (updated, results);
            }
        };

        let moved = move_primary_to(&mut updated, &home_dir, claims);
        let moved_ok = moved.success;
        results.push(moved);

        if moved_ok && home_album.is_some() {
            let target = updated.primary_file.target_path.clone().unwrap();

            match all_photos_directory(entity, context) {
                Ok(dir) => results.push(link_into(
                    &target,
                    &dir,
                    MoveOperation::CreateReverseSymlink,
                    claims,
                )),
                Err(message) => results.push(MoveOperationResult::failed(
                    MoveOperation::CreateReverseSymlink,
                    target.clone(),
                    message,
                )),
            }

            for album in updated.albums_map.keys() {
                if Some(album.as_str()) == home_album.as_deref() {
                    continue;
                }
                match album_directory(album, entity, context) {
                    Ok(dir) => results.push(
                        link_into(&target, &dir, MoveOperation::CreateSymlink, claims)
                            .with_album(album),
                    ),
                    Err(message) => results.push(
                        MoveOperationResult::failed(
                            MoveOperation::CreateSymlink,
                            target.clone(),
                            message,
                        )
                        .with_album(album),
                    ),
                }
            }
        }

        results.extend(delete_secondaries(&updated));
        (updated, results)
    }
}

/// Primaries live in ALL_PHOTOS; albums hold full copies.
struct DuplicateCopyStrategy;

impl MovingStrategy for DuplicateCopyStrategy {
    fn name(&self) -> &'static str {
        "duplicate-copy"
    }

    fn process(
        &self,
        entity: &MediaEntity,
        context: &MovingContext,
        claims: &TargetClaims,
    ) -> (MediaEntity, Vec<MoveOperationResult>) {
        let mut updated = entity.clone();
        let mut results = Vec::new();

        let dir = match all_photos_directory(entity, context) {
            Ok(dir) => dir,
            Err(message) => {
                results.push(MoveOperationResult::failed(
                    MoveOperation::Move,
                    entity.primary_file.source_path.clone(),
                    message,
                ));
                return (updated, results);
            }
        };

        let moved = move_primary_to(&mut updated, &dir, claims);
        let moved_ok = moved.success;
        results.push(moved);

        if moved_ok {
            let target = updated.primary_file.target_path.clone().unwrap();
            for album in updated.albums_map.keys() {
                match album_directory(album, entity, context) {
                    Ok(album_dir) => {
                        results.push(copy_into(&target, &album_dir, claims).with_album(album));
                    }
                    Err(message) => results.push(
                        MoveOperationResult::failed(MoveOperation::Copy, target.clone(), message)
                            .with_album(album),
                    ),
                }
            }
        }

        results.extend(delete_secondaries(&updated));
        (updated, results)
    }
}

/// Flat ALL_PHOTOS plus an `albums-info.json` index, built incrementally
/// while files are materialized and flushed at finalize.
struct JsonIndexStrategy {
    index: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl JsonIndexStrategy {
    fn new() -> Self {
        JsonIndexStrategy {
            index: Mutex::new(BTreeMap::new()),
        }
    }
}

impl MovingStrategy for JsonIndexStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn process(
        &self,
        entity: &MediaEntity,
        context: &MovingContext,
        claims: &TargetClaims,
    ) -> (MediaEntity, Vec<MoveOperationResult>) {
        let mut updated = entity.clone();
        let mut results = Vec::new();

        let dir = match all_photos_directory(entity, context) {
            Ok(dir) => dir,
            Err(message) => {
                results.push(MoveOperationResult::failed(
                    MoveOperation::Move,
                    entity.primary_file.source_path.clone(),
                    message,
                ));
                return (updated, results);
            }
        };

        let moved = move_primary_to(&mut updated, &dir, claims);
        let moved_ok = moved.success;
        results.push(moved);

        if moved_ok && !updated.albums_map.is_empty() {
            let target = updated.primary_file.target_path.clone().unwrap();
            let basename = target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let mut index = self.index.lock().unwrap();
            let albums = index.entry(basename).or_default();
            for album in updated.albums_map.keys() {
                albums.insert(album.clone());
                results.push(
                    MoveOperationResult::ok(
                        MoveOperation::CreateJsonReference,
                        target.clone(),
                        None,
                    )
                    .with_album(album),
                );
            }
        }

        results.extend(delete_secondaries(&updated));
        (updated, results)
    }

    fn finalize(&self, context: &MovingContext) -> Vec<MoveOperationResult> {
        let index = self.index.lock().unwrap();
        let as_lists: BTreeMap<&String, Vec<&String>> = index
            .iter()
            .map(|(name, albums)| (name, albums.iter().collect()))
            .collect();

        let path = context.output_directory.join(ALBUMS_INFO_FILE);
        let outcome = serde_json::to_string_pretty(&as_lists)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));

        vec![match outcome {
            Ok(()) => MoveOperationResult::ok(
                MoveOperation::CreateJsonReference,
                path.clone(),
                Some(path),
            ),
            Err(message) => MoveOperationResult::failed(
                MoveOperation::CreateJsonReference,
                path,
                message,
            ),
        }]
    }
}

/// Flat ALL_PHOTOS; album information is discarded entirely.
struct FlatStrategy;

impl MovingStrategy for FlatStrategy {
    fn name(&self) -> &'static str {
        "nothing"
    }

    fn process(
        &self,
        entity: &MediaEntity,
        context: &MovingContext,
        claims: &TargetClaims,
    ) -> (MediaEntity, Vec<MoveOperationResult>) {
        let mut updated = entity.clone();
        let mut results = Vec::new();

        let dir = match all_photos_directory(entity, context) {
            Ok(dir) => dir,
            Err(message) => {
                results.push(MoveOperationResult::failed(
                    MoveOperation::Move,
                    entity.primary_file.source_path.clone(),
                    message,
                ));
                return (updated, results);
            }
        };

        results.push(move_primary_to(&mut updated, &dir, claims));
        results.extend(delete_secondaries(&updated));
        (updated, results)
    }
}

// MARK: - Moving service

#[derive(Debug, Default)]
pub struct MovingResult {
    pub results: Vec<MoveOperationResult>,
    pub moved: usize,
    pub failures: usize,
}

/// Drive the configured strategy over every entity, in parallel on the
/// file-io pool, and verify that every primary was accounted for.
pub fn move_files(
    collection: &mut MediaCollection,
    context: &MovingContext,
    pools: &ConcurrencyManager,
) -> MovingResult {
    let strategy = strategy_for(context.album_behavior);
    let claims = TargetClaims::new();

    let bar = ProgressBar::new(collection.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message(format!("Moving files ({})", strategy.name()));

    let num_workers = pools.limit(OperationClass::FileIo);
    let (job_tx, job_rx) = unbounded::<(usize, MediaEntity)>();
    let (result_tx, result_rx) = unbounded::<(usize, MediaEntity, Vec<MoveOperationResult>)>();

    let jobs: Vec<(usize, MediaEntity)> = collection
        .iter()
        .cloned()
        .enumerate()
        .collect();

    pools.pool(OperationClass::FileIo).scope(|s| {
        s.spawn(move |_| {
            for job in jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        for _ in 0..num_workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let strategy = &strategy;
            let claims = &claims;
            let bar = bar.clone();
            s.spawn(move |_| {
                for (index, entity) in job_rx {
                    let (updated, results) = strategy.process(&entity, context, claims);
                    if context.verbose {
                        for r in &results {
                            log::info!(
                                "{} {} -> {} [{}]",
                                r.operation.as_str(),
                                r.source.display(),
                                r.target.as_ref().map(|t| t.display().to_string()).unwrap_or_default(),
                                if r.success { "ok" } else { "failed" }
                            );
                        }
                    }
                    bar.inc(1);
                    if result_tx.send((index, updated, results)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    bar.finish_with_message("Moving complete");

    let mut moving = MovingResult::default();
    let mut updates: Vec<(usize, MediaEntity)> = Vec::new();

    for (index, updated, results) in result_rx {
        // Every primary must have received a MOVE or DELETE; otherwise the
        // summary gets a synthetic failure so the run is auditable.
        let accounted = updated.primary_file.target_path.is_some()
            || results.iter().any(|r| {
                r.success
                    && r.operation == MoveOperation::Delete
                    && r.source == updated.primary_file.source_path
            });
        moving.results.extend(results);
        if !accounted {
            moving.results.push(MoveOperationResult::failed(
                MoveOperation::Move,
                updated.primary_file.source_path.clone(),
                "primary file left unaccounted by the moving strategy".to_string(),
            ));
        }
        updates.push((index, updated));
    }

    collection.apply_updates(updates);
    moving.results.extend(strategy.finalize(context));

    moving.moved = moving
        .results
        .iter()
        .filter(|r| r.success && r.operation == MoveOperation::Move)
        .count();
    moving.failures = moving.results.iter().filter(|r| !r.success).count();

    moving
}
