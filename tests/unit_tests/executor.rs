use hofem::config::{Backend, ExecutionPolicy};
use hofem::executor::{describe, DeviceGridExecutor, ElementExecutor, ParallelExecutor, SequentialExecutor};
use hofem::with_executor;
use matrixcompare::assert_scalar_eq;
use util::assert_panics;

fn mark_chunks<E: ElementExecutor>(executor: &E, num_elements: usize, chunk_len: usize) -> Vec<usize> {
    let mut output = vec![usize::MAX; num_elements * chunk_len];
    executor.for_each_element(&mut output, chunk_len, |e, chunk| {
        for (i, v) in chunk.iter_mut().enumerate() {
            *v = e * 1000 + i;
        }
    });
    output
}

fn expected_marks(num_elements: usize, chunk_len: usize) -> Vec<usize> {
    (0..num_elements)
        .flat_map(|e| (0..chunk_len).map(move |i| e * 1000 + i))
        .collect()
}

#[test]
fn every_element_owns_its_chunk() {
    for (num_elements, chunk_len) in [(0, 4), (1, 1), (10, 9), (257, 4), (1000, 2)] {
        let expected = expected_marks(num_elements, chunk_len);
        assert_eq!(mark_chunks(&SequentialExecutor, num_elements, chunk_len), expected);
        assert_eq!(mark_chunks(&ParallelExecutor, num_elements, chunk_len), expected);
        for block_size in [1, 3, 32, 256, 1024] {
            let device = DeviceGridExecutor::new(block_size);
            assert_eq!(mark_chunks(&device, num_elements, chunk_len), expected);
        }
    }
}

#[test]
fn output_must_be_a_whole_number_of_chunks() {
    let kernel = |_: usize, _: &mut [f64]| {};
    assert_panics!(SequentialExecutor.for_each_element(&mut [0.0; 7], 2, kernel));
    assert_panics!(ParallelExecutor.for_each_element(&mut [0.0; 7], 2, kernel));
    assert_panics!(DeviceGridExecutor::new(4).for_each_element(&mut [0.0; 7], 2, kernel));
}

#[test]
fn sums_agree_across_executors() {
    // Integers up to 2^53 are exact in f64, so every summation order gives the same result
    for n in [0usize, 1, 2, 255, 256, 257, 1000, 4099] {
        let expected = (n * n.saturating_sub(1) / 2) as f64;
        let term = |i: usize| i as f64;
        assert_eq!(SequentialExecutor.sum(n, term), expected);
        assert_eq!(ParallelExecutor.sum(n, term), expected);
        for block_size in [1, 7, 256, 1024] {
            assert_eq!(DeviceGridExecutor::new(block_size).sum(n, term), expected, "block size {}", block_size);
        }
    }
}

#[test]
fn device_reduction_of_fractional_terms() {
    let n = 10_000;
    let term = |i: usize| 1.0 / (i as f64 + 1.0);
    let sequential: f64 = SequentialExecutor.sum(n, term);
    let device: f64 = DeviceGridExecutor::new(128).sum(n, term);
    assert_scalar_eq!(device, sequential, comp = abs, tol = 1e-12);
}

#[test]
fn device_launch_geometry_is_recomputed_per_launch() {
    let executor = DeviceGridExecutor::new(64);
    assert_eq!(executor.block_size(), 64);
    assert_eq!(executor.launch_config(1).grid_size(), 1);
    assert_eq!(executor.launch_config(65).grid_size(), 2);
    assert_eq!(executor.launch_config(0).grid_size(), 0);
}

#[test]
fn with_executor_selects_the_policy_backend() {
    for backend in [Backend::Sequential, Backend::Parallel, Backend::Device] {
        let policy = ExecutionPolicy {
            backend,
            block_size: 16,
        };
        let selected = with_executor!(policy, |exec| exec.backend());
        assert_eq!(selected, backend);
    }
}

#[test]
fn describe_names_the_executor() {
    let policy = |backend| ExecutionPolicy {
        backend,
        block_size: 128,
    };
    assert_eq!(describe(policy(Backend::Sequential)), "sequential");
    assert_eq!(describe(policy(Backend::Parallel)), "parallel");
    assert_eq!(describe(policy(Backend::Device)), "device (block size 128)");
}
