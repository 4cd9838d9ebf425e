//! Execution strategies for element-local work.
//!
//! Kernel bodies are written once against [`ElementExecutor`] and receive the element index
//! together with the disjoint output chunk owned by that element. The executor decides how
//! elements are scheduled:
//!
//! - [`SequentialExecutor`] iterates on the calling thread.
//! - [`ParallelExecutor`] distributes elements over the rayon thread pool.
//! - [`DeviceGridExecutor`] launches a grid of thread blocks, one thread per element, with each
//!   block running its lanes to completion and out-of-range lanes idling.
//!
//! All three produce the same per-element results. Reductions differ only in summation order.
use crate::config::{Backend, ExecutionPolicy};
use crate::error::OrFatal;
use crate::launch::LaunchConfig;
use hofem_traits::Real;
use log::trace;
use rayon::prelude::*;
use std::cell::RefCell;
use thread_local::ThreadLocal;

pub trait ElementExecutor: Sync {
    fn backend(&self) -> Backend;

    /// Calls `kernel(e, chunk)` for every element `e`, where `chunk` is
    /// `output[e * chunk_len .. (e + 1) * chunk_len]`.
    ///
    /// # Panics
    ///
    /// Panics if the output length is not a multiple of `chunk_len`.
    fn for_each_element<T, F>(&self, output: &mut [T], chunk_len: usize, kernel: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send;

    /// Computes `term(0) + term(1) + ... + term(n - 1)`.
    fn sum<T, F>(&self, n: usize, term: F) -> T
    where
        T: Real,
        F: Fn(usize) -> T + Sync + Send;
}

#[derive(Debug, Copy, Clone, Default)]
pub struct SequentialExecutor;

#[derive(Debug, Copy, Clone, Default)]
pub struct ParallelExecutor;

#[derive(Debug, Copy, Clone)]
pub struct DeviceGridExecutor {
    block_size: usize,
}

impl DeviceGridExecutor {
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The launch geometry for `num_elements` elements, recomputed for every launch.
    pub fn launch_config(&self, num_elements: usize) -> LaunchConfig {
        LaunchConfig::new(num_elements, self.block_size).or_fatal("device launch")
    }
}

fn num_chunks(len: usize, chunk_len: usize) -> usize {
    if chunk_len == 0 {
        assert_eq!(len, 0, "zero chunk length requires empty output");
        return 0;
    }
    assert_eq!(
        len % chunk_len,
        0,
        "output length {} is not a multiple of the element chunk length {}",
        len,
        chunk_len
    );
    len / chunk_len
}

impl ElementExecutor for SequentialExecutor {
    fn backend(&self) -> Backend {
        Backend::Sequential
    }

    fn for_each_element<T, F>(&self, output: &mut [T], chunk_len: usize, kernel: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if num_chunks(output.len(), chunk_len) == 0 {
            return;
        }
        for (e, chunk) in output.chunks_exact_mut(chunk_len).enumerate() {
            kernel(e, chunk);
        }
    }

    fn sum<T, F>(&self, n: usize, term: F) -> T
    where
        T: Real,
        F: Fn(usize) -> T + Sync + Send,
    {
        (0..n).fold(T::zero(), |acc, i| acc + term(i))
    }
}

impl ElementExecutor for ParallelExecutor {
    fn backend(&self) -> Backend {
        Backend::Parallel
    }

    fn for_each_element<T, F>(&self, output: &mut [T], chunk_len: usize, kernel: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if num_chunks(output.len(), chunk_len) == 0 {
            return;
        }
        output
            .par_chunks_exact_mut(chunk_len)
            .enumerate()
            .for_each(|(e, chunk)| kernel(e, chunk));
    }

    fn sum<T, F>(&self, n: usize, term: F) -> T
    where
        T: Real,
        F: Fn(usize) -> T + Sync + Send,
    {
        (0..n)
            .into_par_iter()
            .fold(T::zero, |acc, i| acc + term(i))
            .reduce(T::zero, |a, b| a + b)
    }
}

impl ElementExecutor for DeviceGridExecutor {
    fn backend(&self) -> Backend {
        Backend::Device
    }

    fn for_each_element<T, F>(&self, output: &mut [T], chunk_len: usize, kernel: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        let num_elements = num_chunks(output.len(), chunk_len);
        let launch = self.launch_config(num_elements);
        if num_elements == 0 {
            return;
        }
        trace!(
            "Launching grid of {} blocks x {} threads for {} elements",
            launch.grid_size(),
            launch.block_size(),
            num_elements
        );

        let block_size = launch.block_size();
        output
            .par_chunks_mut(block_size * chunk_len)
            .enumerate()
            .for_each(|(block_idx, block)| {
                for thread_idx in 0..block_size {
                    let e = block_idx * block_size + thread_idx;
                    if e >= num_elements {
                        break;
                    }
                    let offset = thread_idx * chunk_len;
                    kernel(e, &mut block[offset..offset + chunk_len]);
                }
            });
    }

    fn sum<T, F>(&self, n: usize, term: F) -> T
    where
        T: Real,
        F: Fn(usize) -> T + Sync + Send,
    {
        let launch = self.launch_config(n);
        let block_size = launch.block_size();
        // Each worker reuses one block-sized array as the block's shared memory
        let shared_memory: ThreadLocal<RefCell<Vec<T>>> = ThreadLocal::new();

        let block_partials: Vec<T> = (0..launch.grid_size())
            .into_par_iter()
            .map(|block_idx| {
                let mut shared = shared_memory
                    .get_or(|| RefCell::new(Vec::with_capacity(block_size)))
                    .borrow_mut();
                shared.clear();
                shared.extend((0..block_size).map(|thread_idx| {
                    let i = block_idx * block_size + thread_idx;
                    if i < n {
                        term(i)
                    } else {
                        T::zero()
                    }
                }));
                tree_reduce(&mut shared)
            })
            .collect();

        // Block partials are summed on the host
        block_partials
            .into_iter()
            .fold(T::zero(), |acc, partial| acc + partial)
    }
}

/// Pairwise in-place reduction with halving stride, as done in block shared memory.
fn tree_reduce<T: Real>(values: &mut [T]) -> T {
    let mut active = values.len();
    if active == 0 {
        return T::zero();
    }
    while active > 1 {
        let half = (active + 1) / 2;
        for lane in 0..active - half {
            let other = values[lane + half];
            values[lane] += other;
        }
        active = half;
    }
    values[0]
}

/// Runs `$body` with `$exec` bound to the executor selected by an [`ExecutionPolicy`].
///
/// The body is instantiated once per strategy, so generic kernels are monomorphized
/// for each backend.
#[macro_export]
macro_rules! with_executor {
    ($policy:expr, |$exec:ident| $body:expr) => {{
        let policy: $crate::config::ExecutionPolicy = $policy;
        match policy.backend {
            $crate::config::Backend::Sequential => {
                let $exec = &$crate::executor::SequentialExecutor;
                $body
            }
            $crate::config::Backend::Parallel => {
                let $exec = &$crate::executor::ParallelExecutor;
                $body
            }
            $crate::config::Backend::Device => {
                let $exec = &$crate::executor::DeviceGridExecutor::new(policy.block_size);
                $body
            }
        }
    }};
}

/// Returns a human-readable name for the executor belonging to a policy, for diagnostics.
pub fn describe(policy: ExecutionPolicy) -> String {
    match policy.backend {
        Backend::Device => format!("{} (block size {})", policy.backend, policy.block_size),
        backend => backend.to_string(),
    }
}
