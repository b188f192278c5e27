use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::takeoutsort_core::albums::merge_albums;
use crate::takeoutsort_core::concurrency::ConcurrencyManager;
use crate::takeoutsort_core::config::{ExtensionFixMode, ProcessingConfig};
use crate::takeoutsort_core::dates::extract_dates;
use crate::takeoutsort_core::dedup::remove_duplicates;
use crate::takeoutsort_core::discovery::discover_media;
use crate::takeoutsort_core::error::{Result, TakeoutError};
use crate::takeoutsort_core::exif_write::write_exif_metadata;
use crate::takeoutsort_core::exiftool::discover_exiftool;
use crate::takeoutsort_core::fileops::copy_file;
use crate::takeoutsort_core::media::{
    ExtractionMethod, MediaCollection, declared_mime, extension_for_mime, is_media_file,
    is_tiff_family, sniff_mime,
};
use crate::takeoutsort_core::paths::{resolve_google_photos_root, unique_path};
use crate::takeoutsort_core::strategies::move_files;
use crate::takeoutsort_core::target_paths::MovingContext;

/// Outcome of one pipeline step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub duration: Duration,
    pub success: bool,
    pub skipped: bool,
    pub message: String,
    pub structured_data: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl StepResult {
    fn success(name: &str, duration: Duration, message: String) -> Self {
        StepResult {
            step_name: name.to_string(),
            duration,
            success: true,
            skipped: false,
            message,
            structured_data: BTreeMap::new(),
            error: None,
        }
    }

    fn skipped(name: &str, reason: &str) -> Self {
        StepResult {
            step_name: name.to_string(),
            duration: Duration::ZERO,
            success: true,
            skipped: true,
            message: reason.to_string(),
            structured_data: BTreeMap::new(),
            error: None,
        }
    }

    fn failed(name: &str, duration: Duration, error: &TakeoutError) -> Self {
        StepResult {
            step_name: name.to_string(),
            duration,
            success: false,
            skipped: false,
            message: error.to_string(),
            structured_data: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }

    fn with_data(mut self, key: &str, value: String) -> Self {
        self.structured_data.insert(key.to_string(), value);
        self
    }
}

/// Aggregated outcome of a full run.
#[derive(Debug, Default)]
pub struct PipelineResult {
    pub steps: Vec<StepResult>,
    pub total_duration: Duration,
    pub success: bool,
    pub media_count: usize,
    pub duplicates_removed: usize,
    pub albums_merged: usize,
    pub dates_extracted: usize,
    pub coordinates_written: usize,
    pub date_times_written: usize,
    pub extensions_fixed: usize,
    pub extras_skipped: usize,
    pub files_moved: usize,
    pub method_distribution: HashMap<ExtractionMethod, usize>,
    /// Per-file failure descriptions, truncated for display.
    pub failures: Vec<String>,
}

/// Eight-step orchestrator. Steps run sequentially; a failure aborts the
/// remainder while preserving completed steps' effects.
pub struct Pipeline {
    config: ProcessingConfig,
    pools: ConcurrencyManager,
}

impl Pipeline {
    pub fn new(config: ProcessingConfig) -> Self {
        Pipeline {
            config,
            pools: ConcurrencyManager::new(),
        }
    }

    pub fn with_pools(config: ProcessingConfig, pools: ConcurrencyManager) -> Self {
        Pipeline { config, pools }
    }

    pub fn run(&self) -> Result<PipelineResult> {
        let started = Instant::now();
        let mut result = PipelineResult::default();

        // Preflight: input, optional working copy, root resolution, output,
        // disk space.
        if !self.config.input_path.exists() {
            return Err(TakeoutError::InputNotFound(self.config.input_path.clone()));
        }

        let input_root = if self.config.keep_input {
            let copy = sibling_working_copy(&self.config.input_path)?;
            log::info!("keep-input: operating on working copy {}", copy.display());
            copy
        } else {
            self.config.input_path.clone()
        };

        let photos_root = resolve_google_photos_root(&input_root)?;

        std::fs::create_dir_all(&self.config.output_path)
            .map_err(|_| TakeoutError::OutputNotWritable(self.config.output_path.clone()))?;

        check_disk_space(&photos_root, &self.config)?;

        let exiftool = discover_exiftool();
        match &exiftool {
            Some(path) => log::info!("Found exiftool at {}", path.display()),
            None => log::warn!("exiftool not found; only native JPEG EXIF writes will run"),
        }

        // Step 1: Fix Extensions
        if self.config.fix_extensions_mode == ExtensionFixMode::None {
            result.steps.push(StepResult::skipped("Fix Extensions", "disabled"));
        } else {
            let step_started = Instant::now();
            let fixed = match fix_extensions(&photos_root, self.config.fix_extensions_mode) {
                Ok(fixed) => fixed,
                Err(e) => {
                    result
                        .steps
                        .push(StepResult::failed("Fix Extensions", step_started.elapsed(), &e));
                    result.total_duration = started.elapsed();
                    return Ok(result);
                }
            };
            result.extensions_fixed = fixed;
            result.steps.push(
                StepResult::success(
                    "Fix Extensions",
                    step_started.elapsed(),
                    format!("{fixed} extensions fixed"),
                )
                .with_data("extensions_fixed", fixed.to_string()),
            );
            if self.config.fix_extensions_mode == ExtensionFixMode::Solo {
                result.success = true;
                result.total_duration = started.elapsed();
                return Ok(result);
            }
        }

        // Step 2: Discover Media
        let step_started = Instant::now();
        let (mut collection, discovery) = match discover_media(&photos_root, &self.config) {
            Ok(discovered) => discovered,
            Err(e) => {
                result
                    .steps
                    .push(StepResult::failed("Discover Media", step_started.elapsed(), &e));
                result.total_duration = started.elapsed();
                return Ok(result);
            }
        };
        result.media_count = discovery.media_found;
        result.extras_skipped = discovery.extras_skipped;
        result.steps.push(
            StepResult::success(
                "Discover Media",
                step_started.elapsed(),
                format!(
                    "{} media files in {} year folders and {} albums",
                    discovery.media_found, discovery.year_folders, discovery.album_folders
                ),
            )
            .with_data("media_found", discovery.media_found.to_string())
            .with_data("extras_skipped", discovery.extras_skipped.to_string()),
        );

        // Step 3: Remove Duplicates
        let step_started = Instant::now();
        let removed = remove_duplicates(&mut collection, &self.config, &self.pools);
        result.duplicates_removed = removed;
        result.steps.push(
            StepResult::success(
                "Remove Duplicates",
                step_started.elapsed(),
                format!("{removed} duplicates removed"),
            )
            .with_data("duplicates_removed", removed.to_string()),
        );

        // Step 4: Extract Dates
        let step_started = Instant::now();
        let dates = extract_dates(
            &mut collection,
            &self.config,
            &self.pools,
            &photos_root,
            exiftool.is_some(),
        );
        result.dates_extracted = dates.dates_found;
        result.method_distribution = dates.method_counts;
        result.steps.push(
            StepResult::success(
                "Extract Dates",
                step_started.elapsed(),
                format!("{} of {} dated", dates.dates_found, collection.len()),
            )
            .with_data("dates_extracted", dates.dates_found.to_string()),
        );

        // Step 5: Write EXIF
        if !self.config.write_exif {
            result.steps.push(StepResult::skipped("Write EXIF", "disabled"));
        } else {
            let step_started = Instant::now();
            let stats = write_exif_metadata(&collection, &self.config, &self.pools, exiftool.as_deref());
            result.coordinates_written = stats.coordinates_written;
            result.date_times_written = stats.date_times_written;
            if stats.failures > 0 {
                result
                    .failures
                    .push(format!("{} files rejected EXIF writes", stats.failures));
            }
            result.steps.push(
                StepResult::success(
                    "Write EXIF",
                    step_started.elapsed(),
                    format!(
                        "{} dates, {} coordinates written ({} failures)",
                        stats.date_times_written, stats.coordinates_written, stats.failures
                    ),
                )
                .with_data("date_times_written", stats.date_times_written.to_string())
                .with_data("coordinates_written", stats.coordinates_written.to_string())
                .with_data("native_files", stats.native_files.to_string())
                .with_data("external_files", stats.external_files.to_string())
                .with_data("native_time_ms", stats.native_time.as_millis().to_string())
                .with_data("external_time_ms", stats.external_time.as_millis().to_string()),
            );
        }

        // Step 6: Find Albums
        let step_started = Instant::now();
        let merged = merge_albums(&mut collection, &self.pools);
        result.albums_merged = merged;
        // A merged album copy is a removed duplicate as far as the summary
        // is concerned.
        result.duplicates_removed += merged;
        result.steps.push(
            StepResult::success(
                "Find Albums",
                step_started.elapsed(),
                format!("{merged} duplicate copies merged into albums"),
            )
            .with_data("albums_merged", merged.to_string()),
        );

        // Step 7: Move Files
        let step_started = Instant::now();
        if self.config.transform_pixel_mp {
            transform_pixel_motion_photos(&mut collection);
        }
        let context = MovingContext {
            output_directory: self.config.output_path.clone(),
            date_division: self.config.date_division,
            album_behavior: self.config.album_behavior,
            divide_partner_shared: self.config.divide_partner_shared,
            verbose: self.config.verbose,
        };
        let moving = move_files(&mut collection, &context, &self.pools);
        result.files_moved = moving.moved;
        for failure in moving.results.iter().filter(|r| !r.success) {
            result.failures.push(format!(
                "{} {}: {}",
                failure.operation.as_str(),
                failure.source.display(),
                failure.message.as_deref().unwrap_or("unknown error")
            ));
        }
        result.steps.push(
            StepResult::success(
                "Move Files",
                step_started.elapsed(),
                format!("{} files moved ({} failures)", moving.moved, moving.failures),
            )
            .with_data("files_moved", moving.moved.to_string())
            .with_data("move_failures", moving.failures.to_string()),
        );

        // Step 8: Update Creation Time
        if !self.config.update_creation_time {
            result
                .steps
                .push(StepResult::skipped("Update Creation Time", "disabled"));
        } else if !cfg!(windows) {
            result.steps.push(StepResult::skipped(
                "Update Creation Time",
                "only meaningful on Windows",
            ));
        } else {
            let step_started = Instant::now();
            match update_creation_times(&self.config.output_path) {
                Ok(()) => result.steps.push(StepResult::success(
                    "Update Creation Time",
                    step_started.elapsed(),
                    "creation times synced to modification times".to_string(),
                )),
                Err(e) => {
                    result.steps.push(StepResult::failed(
                        "Update Creation Time",
                        step_started.elapsed(),
                        &e,
                    ));
                    result.total_duration = started.elapsed();
                    return Ok(result);
                }
            }
        }

        result.success = true;
        result.total_duration = started.elapsed();
        Ok(result)
    }
}

/// Copy the input to a sibling `<name>_tmp` directory and return it.
fn sibling_working_copy(input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    let parent = input.parent().unwrap_or_else(|| Path::new("."));

    let mut copy = parent.join(format!("{name}_tmp"));
    let mut n = 1;
    while copy.exists() {
        n += 1;
        copy = parent.join(format!("{name}_tmp{n}"));
    }

    for entry in WalkDir::new(input) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(input)
            .expect("walked entry is under its root");
        let target = copy.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(copy)
}

/// Free space on the output volume must hold the input set unless the move
/// stays on one filesystem.
fn check_disk_space(photos_root: &Path, config: &ProcessingConfig) -> Result<()> {
    if same_filesystem(photos_root, &config.output_path) && !config.keep_input {
        return Ok(());
    }
    let Some(available_mb) = available_space_mb(&config.output_path) else {
        log::debug!("Disk space probe unavailable; continuing");
        return Ok(());
    };

    let needed_bytes: u64 = WalkDir::new(photos_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    let needed_mb = needed_bytes / (1024 * 1024);

    if available_mb < needed_mb {
        return Err(TakeoutError::InsufficientDiskSpace {
            needed_mb,
            available_mb,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn same_filesystem(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_filesystem(_a: &Path, _b: &Path) -> bool {
    false
}

/// Available space in MB via `df -k`; None when the probe fails.
fn available_space_mb(path: &Path) -> Option<u64> {
    if cfg!(windows) {
        return None;
    }
    let probe = if path.exists() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };
    let output = Command::new("df").arg("-k").arg(&probe).output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let data_line = stdout.lines().nth(1)?;
    let fields: Vec<&str> = data_line.split_whitespace().collect();
    let available_kb: u64 = fields.get(3)?.parse().ok()?;
    Some(available_kb / 1024)
}

/// Step 1: rename files whose content disagrees with their extension.
fn fix_extensions(photos_root: &Path, mode: ExtensionFixMode) -> Result<usize> {
    let mut fixed = 0;

    let files: Vec<PathBuf> = WalkDir::new(photos_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_media_file(p))
        .collect();

    for path in files {
        let Some(sniffed) = sniff_mime(&path) else {
            continue;
        };
        if mode == ExtensionFixMode::Conservative
            && (sniffed == "image/jpeg" || is_tiff_family(sniffed))
        {
            continue;
        }
        // Only fix files with a recognized extension that disagrees with
        // the content; unknown extensions (.MP, .MV) have their own
        // handling elsewhere.
        let Some(declared) = declared_mime(&path) else {
            continue;
        };
        if declared == sniffed {
            continue;
        }
        // Raw formats sniff as TIFF; their extensions are fine as-is.
        if is_tiff_family(sniffed) && declared != "image/tiff" {
            continue;
        }
        let Some(correct_ext) = extension_for_mime(sniffed) else {
            continue;
        };
        let desired = path.with_extension(correct_ext);
        if desired == path {
            continue;
        }

        let renamed = unique_path(&desired);
        match std::fs::rename(&path, &renamed) {
            Ok(()) => {
                log::info!(
                    "Fixed extension: {} -> {}",
                    path.display(),
                    renamed.display()
                );
                fixed += 1;
            }
            Err(e) => log::warn!("Could not fix extension of {}: {e}", path.display()),
        }
    }

    Ok(fixed)
}

/// Rename Pixel motion photo primaries (.MP / .MV) to .mp4 so players
/// recognize them.
fn transform_pixel_motion_photos(collection: &mut MediaCollection) {
    let mut updates = Vec::new();
    for (index, entity) in collection.iter().enumerate() {
        let path = &entity.primary_file.source_path;
        let is_motion = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let lower = e.to_lowercase();
                lower == "mp" || lower == "mv"
            })
            .unwrap_or(false);
        if !is_motion {
            continue;
        }
        let renamed = unique_path(&path.with_extension("mp4"));
        match std::fs::rename(path, &renamed) {
            Ok(()) => {
                let mut updated = entity.clone();
                updated.primary_file.source_path = renamed;
                updates.push((index, updated));
            }
            Err(e) => log::warn!("Could not rename motion photo {}: {e}", path.display()),
        }
    }
    collection.apply_updates(updates);
}

/// Step 8 (Windows): make creation time equal to modification time across
/// the output tree.
#[cfg(windows)]
fn update_creation_times(output: &Path) -> Result<()> {
    let script = format!(
        "Get-ChildItem -LiteralPath '{}' -Recurse -File | ForEach-Object {{ $_.CreationTime = $_.LastWriteTime }}",
        output.display()
    );
    let status = Command::new("powershell")
        .args(["-NoProfile", "-Command", &script])
        .status()?;
    if !status.success() {
        log::warn!("Creation time sync exited with {status}");
    }
    Ok(())
}

#[cfg(not(windows))]
fn update_creation_times(_output: &Path) -> Result<()> {
    Ok(())
}

/// Human summary printed at the end of every run.
pub fn print_summary(result: &PipelineResult) {
    println!("\n─────────────────────────────────");
    println!("Pipeline summary:");
    for step in &result.steps {
        let status = if step.skipped {
            "skipped"
        } else if step.success {
            "ok"
        } else {
            "FAILED"
        };
        println!(
            "  {:<22} {:>8}  {}",
            step.step_name,
            status,
            step.message
        );
    }
    println!("─────────────────────────────────");
    println!("  Media discovered:    {}", result.media_count);
    println!("  Duplicates removed:  {}", result.duplicates_removed);
    println!("  Dates extracted:     {}", result.dates_extracted);
    println!("  EXIF dates written:  {}", result.date_times_written);
    println!("  GPS written:         {}", result.coordinates_written);
    println!("  Extensions fixed:    {}", result.extensions_fixed);
    println!("  Extras skipped:      {}", result.extras_skipped);
    println!("  Files moved:         {}", result.files_moved);

    if !result.method_distribution.is_empty() {
        println!("\nDate extraction methods:");
        for method in ExtractionMethod::all() {
            if let Some(count) = result.method_distribution.get(method) {
                println!("  {:<14} {}", method.as_str(), count);
            }
        }
    }

    if !result.failures.is_empty() {
        println!("\nFailures ({}):", result.failures.len());
        for failure in result.failures.iter().take(5) {
            println!("  - {failure}");
        }
        if result.failures.len() > 5 {
            println!("  ... and {} more", result.failures.len() - 5);
        }
    }

    println!("\nTotal time: {:.2?}", result.total_duration);
}
