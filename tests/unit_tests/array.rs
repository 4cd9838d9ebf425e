use hofem::array::{Array, Layout, Residency};
use hofem::config::{Backend, Config, Runtime};
use hofem::DeviceCopy;

fn device_runtime() -> Runtime {
    Runtime::new(Config::with_backend(Backend::Device).check_residency(true))
}

#[test]
fn layout_length() {
    let layout = Layout::new(10, 3);
    assert_eq!(layout.num_dofs(), 10);
    assert_eq!(layout.vdim(), 3);
    assert_eq!(layout.len(), 30);
    assert_eq!(Layout::scalar(7).len(), 7);
    assert!(Layout::new(usize::MAX, 2).try_len().is_err());
}

#[test]
#[should_panic]
fn layout_requires_positive_vdim() {
    Layout::new(4, 0);
}

#[test]
fn new_arrays_are_zeroed_in_preferred_residency() {
    for runtime in crate::runtimes() {
        let mut array = Array::<f64>::new(&runtime, Layout::new(4, 2));
        assert_eq!(array.len(), 8);
        assert_eq!(array.layout(), Layout::new(4, 2));
        assert_eq!(array.residency(), array.preferred_residency());
        assert_eq!(array.policy(), runtime.policy());
        assert_eq!(array.to_host_vec(), vec![0.0; 8]);
    }
}

#[test]
fn host_arrays_stay_on_host() {
    let runtime = Runtime::new(Config::with_backend(Backend::Parallel));
    let mut array = Array::from_host(&runtime, &[1.0, 2.0, 3.0]);
    assert!(array.device().is_none());
    assert_eq!(array.residency(), Residency::Host);

    array.device_view_mut();
    assert_eq!(array.residency(), Residency::Host);
    array.host_view_mut()[1] = 5.0;
    array.sync_preferred();
    assert_eq!(array.residency(), Residency::Host);

    // The device view aliases host memory
    let view = array.device_view();
    assert!(view.device().is_none());
    assert_eq!(view.len(), 3);
    assert_eq!(array.host_slice(), &[1.0, 5.0, 3.0]);
}

#[test]
fn device_residency_state_machine() {
    let runtime = device_runtime();
    let mut array = Array::from_host(&runtime, &[1.0, 2.0, 3.0]);
    assert_eq!(array.residency(), Residency::Device);

    assert_eq!(array.host_view(), &[1.0, 2.0, 3.0]);
    assert_eq!(array.residency(), Residency::Both);

    array.host_view_mut()[0] = 10.0;
    assert_eq!(array.residency(), Residency::Host);

    array.device_view();
    assert_eq!(array.residency(), Residency::Both);

    array.device_view_mut();
    assert_eq!(array.residency(), Residency::Device);

    // Host contents are refreshed from the device on demand
    assert_eq!(array.to_host_vec(), vec![10.0, 2.0, 3.0]);
    assert_eq!(array.residency(), Residency::Both);
}

#[test]
fn host_writes_reach_the_device_after_sync() {
    let runtime = device_runtime();
    let mut array = Array::from_host(&runtime, &[1.0, 2.0]);
    array.host_view_mut().copy_from_slice(&[3.0, 4.0]);
    array.sync_preferred();
    assert_eq!(array.residency(), Residency::Both);

    // Invalidate the host copy, then read back through the device copy
    array.device_view_mut();
    assert_eq!(array.to_host_vec(), vec![3.0, 4.0]);
}

#[test]
#[should_panic(expected = "residency check")]
fn reading_stale_host_memory_is_detected() {
    let runtime = device_runtime();
    let array = Array::from_host(&runtime, &[1.0, 2.0]);
    array.host_slice();
}

#[test]
#[should_panic(expected = "residency check")]
fn reading_stale_device_memory_is_detected() {
    let runtime = device_runtime();
    let mut array = Array::from_host(&runtime, &[1.0, 2.0]);
    array.host_view_mut();
    array.device_slice();
}

#[test]
fn resize_keeps_prefix_and_zero_fills() {
    for runtime in crate::runtimes() {
        let mut array = Array::from_host(&runtime, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        array.resize(3);
        assert_eq!(array.len(), 3);
        assert_eq!(array.to_host_vec(), vec![1.0, 2.0, 3.0]);

        // Growing within the retained capacity must not resurrect old values
        array.resize(5);
        assert_eq!(array.to_host_vec(), vec![1.0, 2.0, 3.0, 0.0, 0.0]);

        array.resize(8);
        assert_eq!(array.to_host_vec(), vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(array.layout(), Layout::scalar(8));
    }
}

#[test]
fn resize_of_device_only_array() {
    let runtime = device_runtime();
    let mut array = Array::from_host(&runtime, &[1.0, 2.0]);
    assert_eq!(array.residency(), Residency::Device);
    array.resize(4);
    assert_eq!(array.residency(), Residency::Device);
    assert_eq!(array.to_host_vec(), vec![1.0, 2.0, 0.0, 0.0]);
}

#[test]
#[should_panic(expected = "Array::resize")]
fn resize_must_respect_vdim() {
    let runtime = Runtime::new(Config::default());
    let mut array = Array::<f64>::new(&runtime, Layout::new(2, 3));
    array.resize(7);
}

#[test]
fn allocate_discards_contents() {
    for runtime in crate::runtimes() {
        let mut array = Array::from_slice(&runtime, Layout::new(2, 2), &[1.0, 2.0, 3.0, 4.0]);
        array.allocate(6);
        assert_eq!(array.layout(), Layout::new(3, 2));
        assert_eq!(array.residency(), array.preferred_residency());
        assert_eq!(array.to_host_vec(), vec![0.0; 6]);
    }
}

#[test]
#[should_panic(expected = "Array::from_slice")]
fn from_slice_requires_matching_length() {
    let runtime = Runtime::new(Config::default());
    Array::from_slice(&runtime, Layout::new(2, 2), &[1.0, 2.0, 3.0]);
}

#[test]
fn clone_array_copies_or_zeroes() {
    for runtime in crate::runtimes() {
        let mut array = Array::from_host(&runtime, &[1.0, 2.0, 3.0]);
        let mut copy = array.clone_array(true);
        let mut empty = array.clone_array(false);
        assert_eq!(copy.to_host_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(empty.to_host_vec(), vec![0.0; 3]);

        // The clone is independent of the original
        copy.host_view_mut()[0] = -1.0;
        assert_eq!(array.to_host_vec(), vec![1.0, 2.0, 3.0]);
    }
}

#[test]
fn device_memory_is_returned_on_drop() {
    let runtime = device_runtime();
    let device = runtime.device().unwrap().clone();
    {
        let a = Array::<f64>::new(&runtime, Layout::scalar(16));
        let b = a.clone_array(true);
        assert_eq!(device.allocated_bytes(), 2 * 16 * 8);
        drop(b);
        assert_eq!(device.allocated_bytes(), 16 * 8);
    }
    assert_eq!(device.allocated_bytes(), 0);
}

#[test]
#[should_panic(expected = "out of memory")]
fn exceeding_device_memory_is_fatal() {
    let runtime = Runtime::new(Config::with_backend(Backend::Device).device_memory_limit(64));
    Array::<f64>::new(&runtime, Layout::scalar(16));
}

#[test]
fn integer_arrays() {
    let runtime = device_runtime();
    let mut indices = Array::from_host(&runtime, &[3usize, 1, 4, 1, 5]);
    assert_eq!(indices.to_host_vec(), vec![3, 1, 4, 1, 5]);
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
struct NodeRange {
    first: u32,
    count: u32,
}

impl DeviceCopy for NodeRange {}

#[test]
fn user_types_move_to_the_device() {
    let runtime = device_runtime();
    let ranges = [NodeRange { first: 0, count: 4 }, NodeRange { first: 4, count: 2 }];
    let mut array = Array::from_host(&runtime, &ranges);
    assert_eq!(array.residency(), Residency::Device);
    assert_eq!(array.to_host_vec(), ranges.to_vec());
}

#[test]
#[should_panic(expected = "Array::host_slice")]
fn host_slice_of_device_only_array_is_fatal_without_checks() {
    let runtime = Runtime::new(Config::with_backend(Backend::Device).check_residency(false));
    let array = Array::<f64>::new(&runtime, Layout::scalar(4));
    assert_eq!(array.residency(), Residency::Device);
    array.host_slice();
}

#[test]
fn snapshot_leaves_residency_unchanged() {
    let runtime = device_runtime();
    let mut array = Array::from_host(&runtime, &[1.0, 2.0, 3.0]);
    assert_eq!(array.residency(), Residency::Device);
    assert_eq!(array.snapshot(), vec![1.0, 2.0, 3.0]);
    assert_eq!(array.residency(), Residency::Device);

    array.host_view_mut()[1] = 5.0;
    assert_eq!(array.residency(), Residency::Host);
    assert_eq!(array.snapshot(), vec![1.0, 5.0, 3.0]);
}
