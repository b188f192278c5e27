use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use base64::{Engine, engine::general_purpose};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::takeoutsort_core::concurrency::{ConcurrencyManager, OperationClass};
use crate::takeoutsort_core::config::ProcessingConfig;
use crate::takeoutsort_core::media::MediaCollection;

const LIMIT_FILE_SIZE_BYTES: u64 = 64 * 1024 * 1024;

/// Process-wide digest cache keyed by absolute path. The album merger
/// reuses digests computed during deduplication.
static DIGEST_CACHE: OnceLock<RwLock<HashMap<PathBuf, String>>> = OnceLock::new();

fn digest_cache() -> &'static RwLock<HashMap<PathBuf, String>> {
    DIGEST_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Streaming SHA-256 of a file, base64-encoded.
pub fn hash_file(path: &Path) -> Result<String, io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let hash = hasher.finalize();
    Ok(general_purpose::STANDARD.encode(hash))
}

/// Cached digest lookup; errors are logged and yield None (the file is
/// then treated as unique).
pub fn cached_digest(path: &Path) -> Option<String> {
    if let Some(found) = digest_cache().read().unwrap().get(path) {
        return Some(found.clone());
    }
    match hash_file(path) {
        Ok(digest) => {
            digest_cache()
                .write()
                .unwrap()
                .insert(path.to_path_buf(), digest.clone());
            Some(digest)
        }
        Err(e) => {
            log::warn!("Failed to hash {}: {e}", path.display());
            None
        }
    }
}

/// Remove content-identical entities within each album scope.
///
/// Entities are grouped by album-membership key first; identical content in
/// two different albums carries distinct membership and is left for the
/// album merger. Returns the number of entities removed.
pub fn remove_duplicates(
    collection: &mut MediaCollection,
    config: &ProcessingConfig,
    pools: &ConcurrencyManager,
) -> usize {
    if collection.is_empty() {
        return 0;
    }

    let bar = ProgressBar::new(collection.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message("Hashing for duplicates");

    let digests: Vec<Option<String>> = {
        let entities = collection.as_slice();
        pools.install(OperationClass::Cpu, || {
            entities
                .par_iter()
                .map(|entity| {
                    let digest = entity_digest(
                        &entity.primary_file.source_path,
                        config.limit_file_size,
                    );
                    bar.inc(1);
                    digest
                })
                .collect()
        })
    };
    bar.finish_with_message("Hashing complete");

    // (album scope, digest) → entity indices
    let mut groups: HashMap<(Option<String>, String), Vec<usize>> = HashMap::new();
    for (index, digest) in digests.iter().enumerate() {
        let Some(digest) = digest else { continue };
        let entity = collection.get(index).unwrap();
        let scope = entity.first_album().map(str::to_string);
        groups.entry((scope, digest.clone())).or_default().push(index);
    }

    let mut to_remove: BTreeSet<usize> = BTreeSet::new();
    for indices in groups.into_values() {
        if indices.len() < 2 {
            continue;
        }
        let mut ranked = indices;
        ranked.sort_by_key(|&i| {
            let entity = collection.get(i).unwrap();
            (
                entity.date_accuracy(),
                entity.primary_file.source_path.as_os_str().len(),
            )
        });
        // Keep the best-dated, shortest-path copy.
        to_remove.extend(ranked.into_iter().skip(1));
    }

    let removed = collection.remove_indices(&to_remove);
    log::info!("Removed {removed} duplicate entities");
    removed
}

fn entity_digest(path: &Path, limit_file_size: bool) -> Option<String> {
    if limit_file_size {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > LIMIT_FILE_SIZE_BYTES {
            log::debug!("Skipping hash for oversized file {}", path.display());
            return None;
        }
    }
    cached_digest(path)
}
