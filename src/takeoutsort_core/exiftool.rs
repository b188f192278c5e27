use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::takeoutsort_core::error::{Result, TakeoutError};

/// Per-invocation timeout; expired calls count as failures and the batch
/// is retried once through the argfile form.
const CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Conventional install locations probed after PATH.
#[cfg(windows)]
const FALLBACK_LOCATIONS: &[&str] = &[
    r"C:\Program Files\exiftool\exiftool.exe",
    r"C:\exiftool\exiftool.exe",
];
#[cfg(not(windows))]
const FALLBACK_LOCATIONS: &[&str] = &[
    "/usr/bin/exiftool",
    "/usr/local/bin/exiftool",
    "/opt/homebrew/bin/exiftool",
];

#[cfg(windows)]
const TOOL_NAME: &str = "exiftool.exe";
#[cfg(not(windows))]
const TOOL_NAME: &str = "exiftool";

/// Locate the exiftool binary, or None when the external path is
/// unavailable for this run.
pub fn discover_exiftool() -> Option<PathBuf> {
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(TOOL_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    FALLBACK_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// One file's worth of tag writes.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub path: PathBuf,
    /// Tag name → value, in write order.
    pub tags: Vec<(String, String)>,
}

impl PendingWrite {
    /// Batch sizing weight; heavyweight tag sets halve the batch target.
    fn weight(&self) -> usize {
        self.tags.len()
    }
}

#[derive(Debug, Default)]
pub struct BatchStats {
    pub files_written: usize,
    pub failures: usize,
    pub batches_flushed: usize,
    pub total_batch_time: Duration,
}

/// Accumulates tag writes and flushes them through exiftool in adaptively
/// sized batches.
pub struct ExifToolBatch {
    tool: PathBuf,
    pending: Vec<PendingWrite>,
    heavy_pending: bool,
    stats: BatchStats,
}

impl ExifToolBatch {
    pub fn new(tool: PathBuf) -> Self {
        ExifToolBatch {
            tool,
            pending: Vec::new(),
            heavy_pending: false,
            stats: BatchStats::default(),
        }
    }

    fn base_batch_size() -> usize {
        if cfg!(windows) { 60 } else { 120 }
    }

    /// Batches above this size go through an argfile to stay clear of
    /// command-line length limits.
    fn argfile_threshold() -> usize {
        if cfg!(windows) { 30 } else { 60 }
    }

    fn batch_target(&self) -> usize {
        if self.heavy_pending {
            Self::base_batch_size() / 2
        } else {
            Self::base_batch_size()
        }
    }

    pub fn enqueue(&mut self, write: PendingWrite) {
        if write.weight() > 6 {
            self.heavy_pending = true;
        }
        self.pending.push(write);
        if self.pending.len() >= self.batch_target() {
            self.flush();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Submit everything pending. Failures are counted, never raised.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch: Vec<PendingWrite> = std::mem::take(&mut self.pending);
        self.heavy_pending = false;

        let started = Instant::now();
        let use_argfile =
            batch.len() > Self::argfile_threshold() || !homogeneous_tags(&batch);
        let outcome = if use_argfile {
            self.run_argfile(&batch)
        } else {
            self.run_command_line(&batch)
        };

        match outcome {
            Ok(()) => self.stats.files_written += batch.len(),
            Err(TakeoutError::Exiftool(reason)) if reason == "timeout" => {
                log::warn!("exiftool batch of {} timed out, retrying via argfile", batch.len());
                self.stats.failures += batch.len();
                if self.run_argfile(&batch).is_ok() {
                    self.stats.files_written += batch.len();
                }
            }
            Err(e) => {
                log::warn!("exiftool batch of {} failed: {e}", batch.len());
                self.stats.failures += batch.len();
            }
        }

        self.stats.batches_flushed += 1;
        self.stats.total_batch_time += started.elapsed();
    }

    pub fn finish(mut self) -> BatchStats {
        self.flush();
        self.stats
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Single invocation: shared tag pairs, then every target path.
    fn run_command_line(&self, batch: &[PendingWrite]) -> Result<()> {
        let mut cmd = Command::new(&self.tool);
        for (tag, value) in &batch[0].tags {
            cmd.arg(format!("-{tag}={value}"));
        }
        cmd.arg("-overwrite_original_in_place");
        for write in batch {
            cmd.arg(&write.path);
        }
        run_with_timeout(cmd)
    }

    /// Argfile form: one token per line, `-execute` separating per-file
    /// sections so every file gets its own tag values.
    fn run_argfile(&self, batch: &[PendingWrite]) -> Result<()> {
        let mut argfile = tempfile::NamedTempFile::new()?;
        for (i, write) in batch.iter().enumerate() {
            for (tag, value) in &write.tags {
                writeln!(argfile, "-{tag}={value}")?;
            }
            writeln!(argfile, "-overwrite_original_in_place")?;
            writeln!(argfile, "{}", write.path.display())?;
            if i + 1 < batch.len() {
                writeln!(argfile, "-execute")?;
            }
        }
        argfile.flush()?;

        let mut cmd = Command::new(&self.tool);
        cmd.arg("-@").arg(argfile.path());
        run_with_timeout(cmd)
    }
}

fn homogeneous_tags(batch: &[PendingWrite]) -> bool {
    batch.windows(2).all(|pair| pair[0].tags == pair[1].tags)
}

fn run_with_timeout(mut cmd: Command) -> Result<()> {
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| TakeoutError::Exiftool(e.to_string()))?;

    let deadline = Instant::now() + CALL_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(TakeoutError::Exiftool(format!("exit status {status}")));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TakeoutError::Exiftool("timeout".to_string()));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(TakeoutError::Exiftool(e.to_string())),
        }
    }
}

/// The standard tag set for a date write.
pub fn date_tags(stamp: &str, offset: &str) -> Vec<(String, String)> {
    vec![
        ("DateTimeOriginal".to_string(), stamp.to_string()),
        ("CreateDate".to_string(), stamp.to_string()),
        ("ModifyDate".to_string(), stamp.to_string()),
        ("OffsetTime".to_string(), offset.to_string()),
        ("OffsetTimeOriginal".to_string(), offset.to_string()),
        ("OffsetTimeDigitized".to_string(), offset.to_string()),
    ]
}

/// The standard tag set for a GPS write, decimal degrees plus refs.
pub fn gps_tags(latitude: f64, longitude: f64) -> Vec<(String, String)> {
    vec![
        ("GPSLatitude".to_string(), format!("{}", latitude.abs())),
        (
            "GPSLatitudeRef".to_string(),
            if latitude < 0.0 { "S" } else { "N" }.to_string(),
        ),
        ("GPSLongitude".to_string(), format!("{}", longitude.abs())),
        (
            "GPSLongitudeRef".to_string(),
            if longitude < 0.0 { "W" } else { "E" }.to_string(),
        ),
    ]
}
