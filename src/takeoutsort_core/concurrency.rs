use rayon::{ThreadPool, ThreadPoolBuilder};

/// Operation classes with independent parallelism limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Hashing and in-process EXIF parsing.
    Cpu,
    /// External-tool invocations and EXIF I/O.
    Exif,
    /// Move/copy/symlink operations.
    FileIo,
}

/// Named multiplier presets applied to the logical CPU count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Standard,
    Conservative,
    DiskOptimized,
}

impl Preset {
    pub fn multiplier(&self) -> usize {
        match self {
            Preset::Conservative => 1,
            Preset::Standard => 2,
            Preset::DiskOptimized => 4,
        }
    }
}

/// Bounded task pools, one per operation class.
///
/// Steps submit per-entity work through `install`; the pool size is the
/// concurrency gate.
pub struct ConcurrencyManager {
    cpu: ThreadPool,
    exif: ThreadPool,
    file_io: ThreadPool,
}

impl ConcurrencyManager {
    pub fn new() -> Self {
        let cpus = num_cpus::get().max(1);
        Self::with_limits(
            cpus,
            cpus * Preset::Standard.multiplier(),
            cpus * Preset::DiskOptimized.multiplier(),
        )
    }

    /// Explicit pool sizes; used by tests to pin parallelism.
    pub fn with_limits(cpu: usize, exif: usize, file_io: usize) -> Self {
        ConcurrencyManager {
            cpu: build_pool(cpu),
            exif: build_pool(exif),
            file_io: build_pool(file_io),
        }
    }

    pub fn pool(&self, class: OperationClass) -> &ThreadPool {
        match class {
            OperationClass::Cpu => &self.cpu,
            OperationClass::Exif => &self.exif,
            OperationClass::FileIo => &self.file_io,
        }
    }

    /// Run `op` inside the class's bounded pool, blocking until it returns.
    pub fn install<R: Send>(&self, class: OperationClass, op: impl FnOnce() -> R + Send) -> R {
        self.pool(class).install(op)
    }

    pub fn limit(&self, class: OperationClass) -> usize {
        self.pool(class).current_num_threads()
    }
}

impl Default for ConcurrencyManager {
    fn default() -> Self {
        Self::new()
    }
}

fn build_pool(threads: usize) -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .unwrap()
}
