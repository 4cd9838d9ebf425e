use hofem::device::Device;
use std::mem::size_of;
use std::sync::Arc;

#[test]
fn allocation_is_accounted_and_released_on_drop() {
    let device = Arc::new(Device::new(0, None));
    assert_eq!(device.id(), 0);
    assert_eq!(device.allocated_bytes(), 0);

    let a = device.allocate(100, 0.0f64);
    assert_eq!(a.capacity(), 100);
    assert_eq!(device.allocated_bytes(), 100 * size_of::<f64>());

    let b = device.allocate(10, 0u32);
    assert_eq!(device.allocated_bytes(), 100 * size_of::<f64>() + 10 * size_of::<u32>());

    drop(a);
    assert_eq!(device.allocated_bytes(), 10 * size_of::<u32>());
    drop(b);
    assert_eq!(device.allocated_bytes(), 0);
}

#[test]
fn allocation_beyond_limit_fails() {
    let device = Arc::new(Device::new(1, Some(1024)));
    let held = device.try_allocate(100, 0.0f64).unwrap();
    let err = device.try_allocate(100, 0.0f64).unwrap_err();
    assert!(err.to_string().contains("out of memory"));
    // A failed allocation does not leak accounted bytes
    assert_eq!(device.allocated_bytes(), 800);

    drop(held);
    assert!(device.try_allocate(128, 0.0f64).is_ok());
}

#[test]
fn overflowing_allocation_fails() {
    let device = Arc::new(Device::new(0, None));
    assert!(device.try_allocate(usize::MAX, 0.0f64).is_err());
    assert_eq!(device.allocated_bytes(), 0);
}

#[test]
#[should_panic(expected = "device allocation")]
fn allocate_is_fatal_when_out_of_memory() {
    let device = Arc::new(Device::new(0, Some(16)));
    device.allocate(3, 0.0f64);
}

#[test]
fn buffers_know_their_device() {
    let device = Arc::new(Device::new(3, None));
    let mut buffer = device.allocate(8, 1.5f64);
    assert_eq!(buffer.device().id(), 3);
    assert_eq!(buffer.as_slice().len(), 8);
    assert_eq!(buffer.slice(5).len(), 5);
    assert!(buffer.slice(0).is_empty());

    let view = buffer.slice_mut(4);
    assert_eq!(view.len(), 4);
    assert_eq!(view.device().map(Device::id), Some(3));
    assert_eq!(view.as_const().len(), 4);
}
