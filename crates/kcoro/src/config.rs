//! Runtime configuration

/// Default size of the dedicated stack of a core's run loop
pub const DEFAULT_CONTEXT_STACK_SIZE: usize = 256 * 1024;

/// Default ready-queue capacity reserved per core
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How many cores to bring up and how to lay out their run loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of cores, each with its own scheduler
    pub cores: usize,

    /// Ready-queue capacity reserved per core
    pub queue_capacity: usize,

    /// Stack size of each core's run-loop context in bytes
    pub context_stack_size: usize,

    /// Name prefix of the run-loop contexts; the core id is appended
    pub context_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cores: num_cpus::get(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            context_stack_size: DEFAULT_CONTEXT_STACK_SIZE,
            context_name: "kcoro-core".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// One core
    pub fn single_core() -> Self {
        Self::default().with_cores(1)
    }

    /// Set the number of cores (at least one)
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    /// Set the run-loop stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.context_stack_size = bytes;
        self
    }

    /// Defaults, overridden by `KCORO_CORES` and `KCORO_STACK_SIZE` when set and valid
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(cores) = env_usize("KCORO_CORES") {
            config = config.with_cores(cores);
        }
        if let Some(bytes) = env_usize("KCORO_STACK_SIZE") {
            config = config.with_stack_size(bytes);
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
