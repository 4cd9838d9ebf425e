//! Copies between host and device memory.
//!
//! Every copy moves `src.len()` elements into the front of `dst`. A destination shorter than the
//! source is a fatal error. Source and destination can never overlap, since one is borrowed
//! mutably. Device-involving copies are submitted to the owning device's stream; with
//! [`TransferMode::Blocking`] the stream is synchronized before returning, while with
//! [`TransferMode::Async`] the caller must synchronize before reading the destination from the host.
use crate::device::{Device, DeviceSlice, DeviceSliceMut};
use crate::error::fatal;
use hofem_traits::DeviceCopy;
use log::trace;
use std::mem::size_of;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// The copy has completed when the call returns.
    #[default]
    Blocking,
    /// The copy may still be in flight when the call returns.
    Async,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferDirection {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

pub fn host_to_host<T: DeviceCopy>(dst: &mut [T], src: &[T], mode: TransferMode) {
    copy_raw(TransferDirection::HostToHost, dst, src, None, mode);
}

pub fn host_to_device<T: DeviceCopy>(mut dst: DeviceSliceMut<'_, T>, src: &[T], mode: TransferMode) {
    let device = dst.device();
    copy_raw(TransferDirection::HostToDevice, dst.raw_mut(), src, device, mode);
}

pub fn device_to_host<T: DeviceCopy>(dst: &mut [T], src: DeviceSlice<'_, T>, mode: TransferMode) {
    copy_raw(TransferDirection::DeviceToHost, dst, src.raw(), src.device(), mode);
}

pub fn device_to_device<T: DeviceCopy>(mut dst: DeviceSliceMut<'_, T>, src: DeviceSlice<'_, T>, mode: TransferMode) {
    let device = dst.device().or(src.device());
    copy_raw(TransferDirection::DeviceToDevice, dst.raw_mut(), src.raw(), device, mode);
}

fn copy_raw<T: DeviceCopy>(
    direction: TransferDirection,
    dst: &mut [T],
    src: &[T],
    device: Option<&Device>,
    mode: TransferMode,
) {
    let bytes = src.len() * size_of::<T>();
    if dst.len() < src.len() {
        fatal(
            "memcpy",
            format_args!(
                "{:?} copy of {} bytes exceeds the destination allocation of {} bytes",
                direction,
                bytes,
                dst.len() * size_of::<T>()
            ),
        );
    }
    trace!("{:?} copy of {} bytes ({:?})", direction, bytes, mode);
    dst[..src.len()].copy_from_slice(src);

    if let Some(device) = device {
        let stream = device.stream();
        stream.enqueue("memcpy");
        if mode == TransferMode::Blocking {
            stream.synchronize();
        }
    }
}
