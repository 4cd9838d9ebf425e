//! Process-wide backend configuration.
//!
//! A [`Config`] is built once at startup, validated into a [`Runtime`], and the runtime is then
//! passed by reference to everything that allocates buffers or dispatches kernels. There is no
//! global backend state and no way to switch backends on an existing runtime.
use crate::device::Device;
use crate::error::OrFatal;
use crate::launch::{DEFAULT_BLOCK_SIZE, MAX_THREADS_PER_BLOCK};
use eyre::{ensure, WrapErr};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// The execution strategy used for every kernel and vector operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Plain loop over elements on the calling thread.
    #[default]
    Sequential,
    /// Elements are distributed over the rayon thread pool.
    Parallel,
    /// Elements are launched as a grid of thread blocks on the (emulated) accelerator,
    /// with buffers resident in device memory.
    Device,
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Device => write!(f, "device"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Threads per block for device launches.
    pub block_size: usize,
    /// Capacity of device memory in bytes. `None` means unlimited.
    pub device_memory_limit: Option<usize>,
    /// Whether reads from a residency that is not currently valid are asserted against.
    pub check_residency: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            device_memory_limit: None,
            check_residency: cfg!(debug_assertions),
        }
    }
}

impl Config {
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn block_size(self, block_size: usize) -> Self {
        Self { block_size, ..self }
    }

    pub fn device_memory_limit(self, bytes: usize) -> Self {
        Self {
            device_memory_limit: Some(bytes),
            ..self
        }
    }

    pub fn check_residency(self, check: bool) -> Self {
        Self {
            check_residency: check,
            ..self
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(
            (1..=MAX_THREADS_PER_BLOCK).contains(&self.block_size),
            "block size {} is outside the supported range 1..={}",
            self.block_size,
            MAX_THREADS_PER_BLOCK
        );
        if self.backend == Backend::Device {
            ensure!(
                self.device_memory_limit != Some(0),
                "device backend requires a non-zero device memory limit"
            );
        }
        Ok(())
    }
}

/// The backend tag carried by every buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub backend: Backend,
    pub block_size: usize,
}

/// A validated, immutable configuration together with the device context it implies.
#[derive(Debug)]
pub struct Runtime {
    config: Config,
    device: Option<Arc<Device>>,
}

impl Runtime {
    /// Builds a runtime, aborting with a diagnostic if the configuration is invalid.
    pub fn new(config: Config) -> Self {
        Self::try_new(config).or_fatal("Runtime::new")
    }

    pub fn try_new(config: Config) -> eyre::Result<Self> {
        config
            .validate()
            .wrap_err_with(|| format!("invalid configuration for the {} backend", config.backend))?;
        let device = match config.backend {
            Backend::Device => Some(Arc::new(Device::new(0, config.device_memory_limit))),
            Backend::Sequential | Backend::Parallel => None,
        };
        debug!(
            "Created runtime: backend={}, block_size={}, device_memory_limit={:?}",
            config.backend, config.block_size, config.device_memory_limit
        );
        Ok(Self { config, device })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.config.backend
    }

    pub fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            backend: self.config.backend,
            block_size: self.config.block_size,
        }
    }

    /// The device context, present only for [`Backend::Device`].
    pub fn device(&self) -> Option<&Arc<Device>> {
        self.device.as_ref()
    }

    /// Waits for all work enqueued on the device stream.
    pub fn synchronize(&self) {
        if let Some(device) = &self.device {
            device.stream().synchronize();
        }
    }
}
