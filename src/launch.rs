//! Launch geometry and kernel variant selection.
use eyre::{bail, ensure, eyre};
use serde::{Deserialize, Serialize};

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Upper limit on threads per block accepted by the device.
pub const MAX_THREADS_PER_BLOCK: usize = 1024;

/// Upper limit on the number of blocks in a grid.
pub const MAX_GRID_SIZE: usize = (1 << 31) - 1;

/// Largest supported number of degrees of freedom per dimension.
pub const MAX_D1D: usize = 16;

/// Largest supported number of quadrature points per dimension.
pub const MAX_Q1D: usize = 16;

/// Grid and block geometry for a single device dispatch.
///
/// This is derived per dispatch and never stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    num_elements: usize,
    block_size: usize,
    grid_size: usize,
}

impl LaunchConfig {
    /// Computes `grid_size = ceil(num_elements / block_size)`.
    ///
    /// Fails if the block size exceeds what the device can run, or if the grid would be
    /// too large to launch.
    pub fn new(num_elements: usize, block_size: usize) -> eyre::Result<Self> {
        ensure!(
            (1..=MAX_THREADS_PER_BLOCK).contains(&block_size),
            "block size {} is outside the supported range 1..={}",
            block_size,
            MAX_THREADS_PER_BLOCK
        );
        let grid_size = num_elements
            .checked_add(block_size - 1)
            .map(|n| n / block_size)
            .ok_or_else(|| eyre!("element count {} overflows the launch computation", num_elements))?;
        ensure!(
            grid_size <= MAX_GRID_SIZE,
            "grid size {} for {} elements exceeds the device limit of {} blocks",
            grid_size,
            num_elements,
            MAX_GRID_SIZE
        );
        Ok(Self {
            num_elements,
            block_size,
            grid_size,
        })
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Number of launched threads, including idle threads in the last block.
    pub fn total_threads(&self) -> usize {
        self.grid_size * self.block_size
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantKind {
    /// Basis sizes are compile-time constants and scratch space lives on the stack.
    Specialized,
    /// Basis sizes are runtime values and scratch space comes from a per-thread workspace.
    Generic,
}

/// The kernel instantiation chosen for a (dimension, dofs per dimension, quadrature points per dimension) triple.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernelVariant {
    pub dim: usize,
    pub dofs_1d: usize,
    pub quad_1d: usize,
    pub kind: VariantKind,
}

impl KernelVariant {
    pub fn select(dim: usize, dofs_1d: usize, quad_1d: usize) -> eyre::Result<Self> {
        match dim {
            2 | 3 => {}
            1 => bail!("dimension 1 is not supported"),
            _ => bail!("unsupported dimension {}", dim),
        }
        ensure!(
            (1..=MAX_D1D).contains(&dofs_1d),
            "dofs per dimension {} is outside the supported range 1..={}",
            dofs_1d,
            MAX_D1D
        );
        ensure!(
            (1..=MAX_Q1D).contains(&quad_1d),
            "quadrature points per dimension {} is outside the supported range 1..={}",
            quad_1d,
            MAX_Q1D
        );
        let kind = if has_specialization(dofs_1d, quad_1d) {
            VariantKind::Specialized
        } else {
            VariantKind::Generic
        };
        Ok(Self {
            dim,
            dofs_1d,
            quad_1d,
            kind,
        })
    }

    /// Number of degrees of freedom per element.
    pub fn dofs_per_element(&self) -> usize {
        self.dofs_1d.pow(self.dim as u32)
    }

    /// Number of quadrature points per element.
    pub fn quad_per_element(&self) -> usize {
        self.quad_1d.pow(self.dim as u32)
    }
}

/// Whether a const-generic instantiation exists for the given sizes.
///
/// Must agree with the instantiation list in `kernels::mass`.
pub(crate) fn has_specialization(dofs_1d: usize, quad_1d: usize) -> bool {
    (1..=6).contains(&dofs_1d) && (dofs_1d..=dofs_1d + 2).contains(&quad_1d)
}

/// Computes `count * per_item` for buffer sizing, failing on overflow.
pub(crate) fn checked_len(count: usize, per_item: usize, what: &str) -> eyre::Result<usize> {
    count
        .checked_mul(per_item)
        .ok_or_else(|| eyre!("{} length {} x {} overflows", what, count, per_item))
}
