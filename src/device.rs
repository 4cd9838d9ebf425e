//! The accelerator context and device-resident storage.
//!
//! The device is emulated: its memory is a separate allocation that is only reachable through
//! [`DeviceSlice`] and [`DeviceSliceMut`], and every byte is accounted against an optional
//! capacity. Work submitted to the [`Stream`] executes eagerly, but callers must still
//! synchronize before relying on the results from the host, exactly as with a real accelerator.
use crate::error::{fatal, OrFatal};
use eyre::eyre;
use hofem_traits::DeviceCopy;
use log::{debug, trace};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-order queue of device work.
#[derive(Debug, Default)]
pub struct Stream {
    pending: AtomicUsize,
}

impl Stream {
    pub(crate) fn enqueue(&self, what: &str) {
        let pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Enqueued {} on device stream ({} pending)", what, pending);
    }

    /// Blocks until all enqueued work has completed.
    pub fn synchronize(&self) {
        let completed = self.pending.swap(0, Ordering::AcqRel);
        if completed > 0 {
            trace!("Synchronized device stream ({} operations completed)", completed);
        }
    }

    /// Number of operations enqueued since the last synchronization.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

#[derive(Debug)]
pub struct Device {
    id: usize,
    memory_limit: Option<usize>,
    allocated: AtomicUsize,
    stream: Stream,
}

impl Device {
    pub fn new(id: usize, memory_limit: Option<usize>) -> Self {
        Self {
            id,
            memory_limit,
            allocated: AtomicUsize::new(0),
            stream: Stream::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Bytes currently held by live device buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    pub fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }

    /// Allocates `len` elements initialized to `value`, aborting if device memory is exhausted.
    pub fn allocate<T: DeviceCopy>(self: &Arc<Self>, len: usize, value: T) -> DeviceBuffer<T> {
        self.try_allocate(len, value).or_fatal("device allocation")
    }

    pub fn try_allocate<T: DeviceCopy>(self: &Arc<Self>, len: usize, value: T) -> eyre::Result<DeviceBuffer<T>> {
        let bytes = len
            .checked_mul(size_of::<T>())
            .ok_or_else(|| eyre!("allocation of {} elements overflows", len))?;
        self.reserve(bytes)?;
        let mut data = Vec::new();
        if let Err(err) = data.try_reserve_exact(len) {
            self.release(bytes);
            return Err(eyre!("out of memory: failed to allocate {} bytes on device {}: {}", bytes, self.id, err));
        }
        data.resize(len, value);
        debug!(
            "Allocated {} bytes on device {} ({} bytes in use)",
            bytes,
            self.id,
            self.allocated_bytes()
        );
        Ok(DeviceBuffer {
            data: data.into_boxed_slice(),
            device: Arc::clone(self),
        })
    }

    fn reserve(&self, bytes: usize) -> eyre::Result<()> {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let requested = current.checked_add(bytes)?;
                match self.memory_limit {
                    Some(limit) if requested > limit => None,
                    _ => Some(requested),
                }
            })
            .map(|_| ())
            .map_err(|current| {
                eyre!(
                    "out of memory: requested {} bytes on device {} with {} of {:?} bytes in use",
                    bytes,
                    self.id,
                    current,
                    self.memory_limit
                )
            })
    }

    fn release(&self, bytes: usize) {
        let previous = self.allocated.fetch_sub(bytes, Ordering::AcqRel);
        if previous < bytes {
            fatal("device release", format_args!("released {} bytes but only {} were allocated", bytes, previous));
        }
    }
}

/// An owned allocation in device memory. Dropping it returns the memory to the device.
pub struct DeviceBuffer<T: DeviceCopy> {
    data: Box<[T]>,
    device: Arc<Device>,
}

impl<T: DeviceCopy> Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device.id)
            .field("capacity", &self.data.len())
            .finish()
    }
}

impl<T: DeviceCopy> DeviceBuffer<T> {
    /// Number of elements the allocation holds.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn slice(&self, len: usize) -> DeviceSlice<'_, T> {
        DeviceSlice {
            data: &self.data[..len],
            device: Some(&*self.device),
        }
    }

    pub fn slice_mut(&mut self, len: usize) -> DeviceSliceMut<'_, T> {
        DeviceSliceMut {
            data: &mut self.data[..len],
            device: Some(&*self.device),
        }
    }

    pub fn as_slice(&self) -> DeviceSlice<'_, T> {
        self.slice(self.capacity())
    }

    pub fn as_slice_mut(&mut self) -> DeviceSliceMut<'_, T> {
        let len = self.capacity();
        self.slice_mut(len)
    }
}

impl<T: DeviceCopy> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        let bytes = self.data.len() * size_of::<T>();
        self.device.release(bytes);
        debug!(
            "Released {} bytes on device {} ({} bytes in use)",
            bytes,
            self.device.id,
            self.device.allocated_bytes()
        );
    }
}

/// A read-only view of device memory.
///
/// Without a device (host backends) the view aliases host memory.
#[derive(Debug)]
pub struct DeviceSlice<'a, T> {
    data: &'a [T],
    device: Option<&'a Device>,
}

impl<'a, T> Clone for DeviceSlice<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for DeviceSlice<'a, T> {}

/// A mutable view of device memory.
#[derive(Debug)]
pub struct DeviceSliceMut<'a, T> {
    data: &'a mut [T],
    device: Option<&'a Device>,
}

impl<'a, T> DeviceSlice<'a, T> {
    pub(crate) fn unified(data: &'a [T]) -> Self {
        Self { data, device: None }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The device owning the memory, or `None` if the view aliases host memory.
    pub fn device(&self) -> Option<&'a Device> {
        self.device
    }

    /// Access to the raw memory for device-side code.
    pub(crate) fn raw(&self) -> &'a [T] {
        self.data
    }
}

impl<'a, T> DeviceSliceMut<'a, T> {
    pub(crate) fn unified(data: &'a mut [T]) -> Self {
        Self { data, device: None }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn device(&self) -> Option<&'a Device> {
        self.device
    }

    pub fn as_const(&self) -> DeviceSlice<'_, T> {
        DeviceSlice {
            data: &*self.data,
            device: self.device,
        }
    }

    /// Reborrows the view for a shorter lifetime.
    pub fn reborrow(&mut self) -> DeviceSliceMut<'_, T> {
        DeviceSliceMut {
            data: &mut *self.data,
            device: self.device,
        }
    }

    pub(crate) fn raw_mut(&mut self) -> &mut [T] {
        &mut *self.data
    }

    pub(crate) fn into_raw_mut(self) -> &'a mut [T] {
        self.data
    }
}
