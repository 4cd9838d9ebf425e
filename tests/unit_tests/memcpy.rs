use hofem::device::Device;
use hofem::memcpy::{device_to_device, device_to_host, host_to_device, host_to_host, TransferMode};
use std::sync::Arc;
use util::random_values;

fn bits(values: &[f64]) -> Vec<u64> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn host_device_host_round_trip_is_bit_exact() {
    let device = Arc::new(Device::new(0, None));
    let mut source = random_values(1000, 42);
    source.extend([0.0, -0.0, f64::MIN_POSITIVE, f64::MAX, f64::INFINITY, f64::NAN, 1e-310]);

    for mode in [TransferMode::Blocking, TransferMode::Async] {
        let mut buffer = device.allocate(source.len(), 0.0f64);
        host_to_device(buffer.as_slice_mut(), &source, mode);
        device.stream().synchronize();

        let mut back = vec![0.0; source.len()];
        device_to_host(&mut back, buffer.as_slice(), mode);
        device.stream().synchronize();
        assert_eq!(bits(&back), bits(&source));
    }
}

#[test]
fn device_to_device_copies_between_buffers() {
    let device = Arc::new(Device::new(0, None));
    let source = random_values(64, 7);
    let mut a = device.allocate(64, 0.0f64);
    let mut b = device.allocate(64, 0.0f64);
    host_to_device(a.as_slice_mut(), &source, TransferMode::Async);
    device_to_device(b.as_slice_mut(), a.as_slice(), TransferMode::Async);

    let mut back = vec![0.0; 64];
    device_to_host(&mut back, b.as_slice(), TransferMode::Blocking);
    assert_eq!(bits(&back), bits(&source));
}

#[test]
fn copies_fill_the_front_of_a_larger_destination() {
    let mut dst = vec![-1.0; 5];
    host_to_host(&mut dst, &[1.0, 2.0, 3.0], TransferMode::Blocking);
    assert_eq!(dst, vec![1.0, 2.0, 3.0, -1.0, -1.0]);

    let device = Arc::new(Device::new(0, None));
    let mut buffer = device.allocate(4, 9.0f64);
    host_to_device(buffer.as_slice_mut(), &[1.0, 2.0], TransferMode::Blocking);
    let mut back = vec![0.0; 4];
    device_to_host(&mut back, buffer.as_slice(), TransferMode::Blocking);
    assert_eq!(back, vec![1.0, 2.0, 9.0, 9.0]);
}

#[test]
#[should_panic(expected = "memcpy")]
fn destination_shorter_than_source_is_fatal() {
    let mut dst = vec![0.0; 2];
    host_to_host(&mut dst, &[1.0, 2.0, 3.0], TransferMode::Blocking);
}

#[test]
#[should_panic(expected = "exceeds the destination allocation")]
fn device_destination_shorter_than_source_is_fatal() {
    let device = Arc::new(Device::new(0, None));
    let mut buffer = device.allocate(2, 0.0f64);
    host_to_device(buffer.as_slice_mut(), &[1.0, 2.0, 3.0], TransferMode::Async);
}

#[test]
fn async_transfers_are_pending_until_synchronized() {
    let device = Arc::new(Device::new(0, None));
    let mut buffer = device.allocate(3, 0.0f64);

    host_to_device(buffer.as_slice_mut(), &[1.0, 2.0, 3.0], TransferMode::Async);
    host_to_device(buffer.as_slice_mut(), &[4.0, 5.0, 6.0], TransferMode::Async);
    assert_eq!(device.stream().pending(), 2);

    device.stream().synchronize();
    assert!(device.stream().is_idle());

    let mut back = vec![0.0; 3];
    device_to_host(&mut back, buffer.as_slice(), TransferMode::Blocking);
    assert!(device.stream().is_idle());
    assert_eq!(back, vec![4.0, 5.0, 6.0]);
}

#[test]
fn host_copies_do_not_touch_any_stream() {
    let device = Arc::new(Device::new(0, None));
    let mut dst = vec![0u32; 3];
    host_to_host(&mut dst, &[7, 8, 9], TransferMode::Async);
    assert_eq!(dst, vec![7, 8, 9]);
    assert!(device.stream().is_idle());
}
