//! Residency-tracked numeric storage.
//!
//! An [`Array`] owns a run of elements that may be valid in host memory, in device memory, or in
//! both. The accessors transfer on demand and keep the [`Residency`] state in sync: asking for a
//! view in a residency that is not valid copies the data there first, and writing through a
//! mutable view invalidates the other copy. Arrays created by a runtime without a device live on
//! the host only, and their device views alias host memory.
use crate::config::{ExecutionPolicy, Runtime};
use crate::device::{Device, DeviceBuffer, DeviceSlice, DeviceSliceMut};
use crate::error::{fatal, OrFatal};
use crate::memcpy::{device_to_device, device_to_host, host_to_device, host_to_host, TransferMode};
use eyre::{ensure, eyre};
use hofem_traits::DeviceCopy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Logical shape of a buffer: a number of degrees of freedom, each with `vdim` components.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    num_dofs: usize,
    vdim: usize,
}

impl Layout {
    /// # Panics
    ///
    /// Panics if `vdim` is zero.
    pub fn new(num_dofs: usize, vdim: usize) -> Self {
        assert!(vdim > 0, "vdim must be positive");
        Self { num_dofs, vdim }
    }

    /// A layout with a single component per degree of freedom.
    pub fn scalar(num_dofs: usize) -> Self {
        Self::new(num_dofs, 1)
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn vdim(&self) -> usize {
        self.vdim
    }

    pub fn try_len(&self) -> eyre::Result<usize> {
        self.num_dofs
            .checked_mul(self.vdim)
            .ok_or_else(|| eyre!("layout of {} dofs with vdim {} overflows", self.num_dofs, self.vdim))
    }

    /// Number of scalar entries, `num_dofs * vdim`.
    pub fn len(&self) -> usize {
        self.try_len().or_fatal("Layout::len")
    }

    fn with_len(&self, len: usize) -> eyre::Result<Self> {
        ensure!(
            len % self.vdim == 0,
            "length {} is not a multiple of vdim {}",
            len,
            self.vdim
        );
        Ok(Self::new(len / self.vdim, self.vdim))
    }
}

/// Where the contents of a buffer are currently valid.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Residency {
    Host,
    Device,
    Both,
}

impl Residency {
    pub fn host_valid(&self) -> bool {
        matches!(self, Self::Host | Self::Both)
    }

    pub fn device_valid(&self) -> bool {
        matches!(self, Self::Device | Self::Both)
    }
}

#[derive(Debug)]
pub struct Array<T: DeviceCopy> {
    layout: Layout,
    len: usize,
    // Holds `len` elements whenever the host copy is valid. Shrinking keeps capacity.
    host: Vec<T>,
    // Capacity is at least `len` whenever the device copy is valid.
    device: Option<DeviceBuffer<T>>,
    residency: Residency,
    policy: ExecutionPolicy,
    device_ctx: Option<Arc<Device>>,
    check_residency: bool,
}

impl<T: DeviceCopy + Default> Array<T> {
    /// Creates a zeroed array in the runtime's preferred residency.
    pub fn new(runtime: &Runtime, layout: Layout) -> Self {
        let len = layout.len();
        let device_ctx = runtime.device().cloned();
        let (host, device, residency) = match &device_ctx {
            Some(ctx) => (Vec::new(), Some(ctx.allocate(len, T::default())), Residency::Device),
            None => (allocate_host(len), None, Residency::Host),
        };
        Self {
            layout,
            len,
            host,
            device,
            residency,
            policy: runtime.policy(),
            device_ctx,
            check_residency: runtime.config().check_residency,
        }
    }

    /// Creates an array in the runtime's preferred residency holding a copy of `data`.
    pub fn from_slice(runtime: &Runtime, layout: Layout, data: &[T]) -> Self {
        let mut array = Self::new(runtime, layout);
        if data.len() != array.len {
            fatal(
                "Array::from_slice",
                format_args!("data has length {} but layout {:?} requires {}", data.len(), layout, array.len),
            );
        }
        array.copy_from_host(data);
        array
    }

    /// Scalar-layout convenience for [`Array::from_slice`].
    pub fn from_host(runtime: &Runtime, data: &[T]) -> Self {
        Self::from_slice(runtime, Layout::scalar(data.len()), data)
    }

    /// Discards the contents and reserves `len` zeroed elements in the preferred residency.
    pub fn allocate(&mut self, len: usize) {
        let layout = self.layout.with_len(len).or_fatal("Array::allocate");
        self.device = None;
        self.host = Vec::new();
        match &self.device_ctx {
            Some(ctx) => {
                self.device = Some(ctx.allocate(len, T::default()));
                self.residency = Residency::Device;
            }
            None => {
                self.host = allocate_host(len);
                self.residency = Residency::Host;
            }
        }
        self.layout = layout;
        self.len = len;
    }

    /// Changes the length, keeping the leading entries and zero-filling new ones.
    ///
    /// Shrinking retains the allocated capacity. Growing may reallocate.
    pub fn resize(&mut self, new_len: usize) {
        let layout = self.layout.with_len(new_len).or_fatal("Array::resize");
        let old_len = self.len;

        if self.residency.host_valid() {
            grow_host(&mut self.host, new_len);
            self.host.resize(new_len, T::default());
        }

        if self.device_ctx.is_some() && self.residency.device_valid() {
            let capacity = self.device.as_ref().map(DeviceBuffer::capacity).unwrap_or(0);
            if capacity >= new_len {
                if let Some(buffer) = &mut self.device {
                    if new_len > old_len {
                        buffer.as_slice_mut().raw_mut()[old_len..new_len].fill(T::default());
                    }
                }
            } else {
                let ctx = self.device_context();
                let mut grown = ctx.allocate(new_len, T::default());
                if let Some(old) = &self.device {
                    device_to_device(grown.slice_mut(old_len), old.slice(old_len), TransferMode::Async);
                }
                self.device = Some(grown);
            }
        }

        self.layout = layout;
        self.len = new_len;
    }

    /// Replaces the contents with `data`, written to the preferred residency.
    pub fn copy_from_host(&mut self, data: &[T]) {
        if data.len() != self.len {
            fatal(
                "Array::copy_from_host",
                format_args!("data has length {} but the array has length {}", data.len(), self.len),
            );
        }
        if self.device_ctx.is_some() {
            let target = self.device_view_for_overwrite();
            host_to_device(target, data, TransferMode::Async);
        } else {
            host_to_host(self.host_view_mut(), data, TransferMode::Blocking);
        }
    }

    /// Returns an array with the same layout and backend, copying the contents if `copy_data` is set.
    pub fn clone_array(&self, copy_data: bool) -> Self {
        let mut clone = Self {
            layout: self.layout,
            len: self.len,
            host: Vec::new(),
            device: None,
            residency: Residency::Host,
            policy: self.policy,
            device_ctx: self.device_ctx.clone(),
            check_residency: self.check_residency,
        };
        clone.allocate(self.len);
        if copy_data {
            match (&self.device, self.residency.device_valid() && self.device_ctx.is_some()) {
                (Some(buffer), true) => {
                    let target = clone.device_view_for_overwrite();
                    device_to_device(target, buffer.slice(self.len), TransferMode::Async);
                }
                _ => {
                    let source = &self.host[..self.len];
                    clone.copy_from_host(source);
                }
            }
        }
        clone
    }

    /// Makes the contents valid on the host and returns them.
    pub fn host_view(&mut self) -> &[T] {
        self.ensure_host();
        &self.host[..self.len]
    }

    /// Makes the contents valid on the host and returns them for writing.
    ///
    /// The device copy becomes stale.
    pub fn host_view_mut(&mut self) -> &mut [T] {
        self.ensure_host();
        if self.device_ctx.is_some() {
            self.residency = Residency::Host;
        }
        &mut self.host[..self.len]
    }

    /// Makes the contents valid on the device and returns them.
    pub fn device_view(&mut self) -> DeviceSlice<'_, T> {
        self.ensure_device();
        let len = self.len;
        match &self.device {
            Some(buffer) if self.device_ctx.is_some() => buffer.slice(len),
            _ => DeviceSlice::unified(&self.host[..len]),
        }
    }

    /// Makes the contents valid on the device and returns them for writing.
    ///
    /// The host copy becomes stale.
    pub fn device_view_mut(&mut self) -> DeviceSliceMut<'_, T> {
        self.ensure_device();
        self.device_slice_mut_marking_valid()
    }

    /// The host contents, which must already be valid.
    ///
    /// Without residency checks, a host copy that exists but is stale is returned as is. A host
    /// copy that was never materialized is always fatal.
    pub fn host_slice(&self) -> &[T] {
        self.assert_valid(self.residency.host_valid(), "host");
        match self.host.get(..self.len) {
            Some(host) => host,
            None => fatal(
                "Array::host_slice",
                format_args!(
                    "host memory of an array of length {} was never materialized (residency {:?})",
                    self.len, self.residency
                ),
            ),
        }
    }

    /// Copies the valid contents into a new host vector, leaving the residency unchanged.
    pub fn snapshot(&self) -> Vec<T> {
        if self.residency.host_valid() {
            return self.host[..self.len].to_vec();
        }
        let mut values = allocate_host(self.len);
        if let Some(buffer) = &self.device {
            self.device_context().stream().synchronize();
            device_to_host(&mut values, buffer.slice(self.len), TransferMode::Blocking);
        }
        values
    }

    /// The device contents, which must already be valid.
    pub fn device_slice(&self) -> DeviceSlice<'_, T> {
        match &self.device {
            Some(buffer) if self.device_ctx.is_some() => {
                self.assert_valid(self.residency.device_valid(), "device");
                buffer.slice(self.len)
            }
            _ => DeviceSlice::unified(self.host_slice()),
        }
    }

    /// Transfers the contents to the residency the backend computes in, if necessary.
    pub fn sync_preferred(&mut self) {
        self.ensure_device();
    }

    pub fn to_host_vec(&mut self) -> Vec<T> {
        self.host_view().to_vec()
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    /// Device residency for device-backed arrays, host residency otherwise.
    pub fn preferred_residency(&self) -> Residency {
        if self.device_ctx.is_some() {
            Residency::Device
        } else {
            Residency::Host
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn device(&self) -> Option<&Arc<Device>> {
        self.device_ctx.as_ref()
    }

    /// Contents in the preferred residency, which must already be valid.
    pub(crate) fn preferred_slice(&self) -> &[T] {
        self.device_slice().raw()
    }

    /// Contents in the preferred residency for read-modify-write access.
    pub(crate) fn preferred_slice_mut(&mut self) -> &mut [T] {
        self.device_view_mut().into_raw_mut()
    }

    /// Preferred-residency storage whose contents are about to be overwritten entirely.
    ///
    /// No transfer takes place, since the current contents are never read.
    pub(crate) fn preferred_slice_for_overwrite(&mut self) -> &mut [T] {
        self.device_view_for_overwrite().into_raw_mut()
    }

    fn device_view_for_overwrite(&mut self) -> DeviceSliceMut<'_, T> {
        if self.device_ctx.is_some() {
            self.materialize_device();
        } else {
            grow_host(&mut self.host, self.len);
            self.host.resize(self.len, T::default());
        }
        self.device_slice_mut_marking_valid()
    }

    fn device_slice_mut_marking_valid(&mut self) -> DeviceSliceMut<'_, T> {
        let len = self.len;
        if self.device_ctx.is_some() {
            self.residency = Residency::Device;
        }
        match &mut self.device {
            Some(buffer) if self.device_ctx.is_some() => buffer.slice_mut(len),
            _ => DeviceSliceMut::unified(&mut self.host[..len]),
        }
    }

    fn ensure_host(&mut self) {
        if self.residency.host_valid() {
            return;
        }
        let ctx = self.device_context();
        ctx.stream().synchronize();
        grow_host(&mut self.host, self.len);
        self.host.resize(self.len, T::default());
        if let Some(buffer) = &self.device {
            device_to_host(&mut self.host[..self.len], buffer.slice(self.len), TransferMode::Blocking);
        }
        self.residency = Residency::Both;
    }

    fn ensure_device(&mut self) {
        if self.device_ctx.is_none() || self.residency.device_valid() {
            return;
        }
        self.materialize_device();
        if let Some(buffer) = &mut self.device {
            host_to_device(buffer.slice_mut(self.len), &self.host[..self.len], TransferMode::Async);
        }
        self.residency = Residency::Both;
    }

    fn materialize_device(&mut self) {
        let capacity = self.device.as_ref().map(DeviceBuffer::capacity);
        if capacity.map_or(true, |c| c < self.len) {
            // Release the old allocation first so that it does not count against the device limit
            self.device = None;
            let ctx = self.device_context();
            self.device = Some(ctx.allocate(self.len, T::default()));
        }
    }

    fn device_context(&self) -> Arc<Device> {
        match &self.device_ctx {
            Some(ctx) => Arc::clone(ctx),
            None => fatal("Array", "device residency requested for an array without a device"),
        }
    }

    #[track_caller]
    fn assert_valid(&self, valid: bool, location: &str) {
        if self.check_residency && !valid {
            fatal(
                "residency check",
                format_args!(
                    "read from {} memory of an array of length {} whose valid residency is {:?}",
                    location, self.len, self.residency
                ),
            );
        }
    }
}

fn allocate_host<T: DeviceCopy + Default>(len: usize) -> Vec<T> {
    let mut data = Vec::new();
    grow_host(&mut data, len);
    data.resize(len, T::default());
    data
}

fn grow_host<T>(data: &mut Vec<T>, len: usize) {
    let additional = len.saturating_sub(data.len());
    if let Err(err) = data.try_reserve_exact(additional) {
        fatal(
            "host allocation",
            format_args!("out of memory: failed to reserve {} elements: {}", len, err),
        );
    }
}
