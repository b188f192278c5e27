use std::collections::{BTreeSet, HashMap};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::takeoutsort_core::concurrency::{ConcurrencyManager, OperationClass};
use crate::takeoutsort_core::dedup::cached_digest;
use crate::takeoutsort_core::media::{FileReference, MediaCollection, MediaEntity};
use crate::takeoutsort_core::paths::is_year_folder;

/// Fuse entities whose primary files are byte-identical but live in
/// different locations (year bucket vs album folders).
///
/// The canonical copy keeps its primary file; everything else is absorbed
/// as secondary files and album membership. Returns the number of entities
/// merged away.
pub fn merge_albums(collection: &mut MediaCollection, pools: &ConcurrencyManager) -> usize {
    if collection.len() < 2 {
        return 0;
    }

    let bar = ProgressBar::new(collection.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message("Matching albums");

    let digests: Vec<Option<String>> = {
        let entities = collection.as_slice();
        pools.install(OperationClass::Cpu, || {
            entities
                .par_iter()
                .map(|entity| {
                    let digest = cached_digest(&entity.primary_file.source_path);
                    bar.inc(1);
                    digest
                })
                .collect()
        })
    };
    bar.finish_with_message("Album matching complete");

    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, digest) in digests.iter().enumerate() {
        if let Some(digest) = digest {
            buckets.entry(digest.clone()).or_default().push(index);
        }
    }

    let mut to_remove: BTreeSet<usize> = BTreeSet::new();
    let mut replacements: Vec<(usize, MediaEntity)> = Vec::new();

    for indices in buckets.into_values() {
        if indices.len() < 2 {
            continue;
        }

        let canonical_index = elect_canonical(collection, &indices);
        let mut canonical = collection.get(canonical_index).unwrap().clone();

        for &index in &indices {
            if index == canonical_index {
                continue;
            }
            let other = collection.get(index).unwrap();
            absorb(&mut canonical, other);
            to_remove.insert(index);
        }

        replacements.push((canonical_index, canonical));
    }

    let merged = to_remove.len();
    collection.apply_updates(replacements);
    collection.remove_indices(&to_remove);
    log::info!("Merged {merged} entities into their canonical copies");
    merged
}

/// Prefer the copy that lives in a year bucket; otherwise the best-dated
/// one, tie-broken by shortest path.
fn elect_canonical(collection: &MediaCollection, indices: &[usize]) -> usize {
    if let Some(&year_backed) = indices.iter().find(|&&i| {
        let entity = collection.get(i).unwrap();
        entity
            .primary_file
            .source_path
            .ancestors()
            .any(is_year_folder)
    }) {
        return year_backed;
    }

    *indices
        .iter()
        .min_by_key(|&&i| {
            let entity = collection.get(i).unwrap();
            (
                entity.date_accuracy(),
                entity.primary_file.source_path.as_os_str().len(),
            )
        })
        .unwrap()
}

fn absorb(canonical: &mut MediaEntity, other: &MediaEntity) {
    // Union album membership, merging source directory sets per album.
    for (album, info) in &other.albums_map {
        canonical
            .albums_map
            .entry(album.clone())
            .or_default()
            .source_directories
            .extend(info.source_directories.iter().cloned());
    }

    // The other primary becomes a secondary physical copy.
    let other_primary = &other.primary_file.source_path;
    let already_known = canonical.primary_file.source_path == *other_primary
        || canonical
            .secondary_files
            .iter()
            .any(|f| f.source_path == *other_primary);
    if !already_known {
        canonical
            .secondary_files
            .push(FileReference::new(other_primary.clone()));
    }
    for secondary in &other.secondary_files {
        if !canonical
            .secondary_files
            .iter()
            .any(|f| f.source_path == secondary.source_path)
        {
            canonical.secondary_files.push(secondary.clone());
        }
    }

    // Adopt a better date.
    if other.has_date() && other.date_accuracy() < canonical.date_accuracy() {
        canonical.date_taken = other.date_taken;
        canonical.date_method = other.date_method;
    }

    canonical.partner_shared |= other.partner_shared;
}
