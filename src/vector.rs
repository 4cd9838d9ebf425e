//! Backend-executed arithmetic on residency-tracked arrays.
//!
//! All arithmetic runs on the preferred residency of the operands with the executor of their
//! backend. Operands must be valid there; call [`Array::sync_preferred`] after writing through a
//! host view of a device-backed vector.
use crate::array::{Array, Layout};
use crate::config::Runtime;
use crate::error::fatal;
use crate::executor::ElementExecutor;
use crate::with_executor;
use hofem_traits::{DeviceCopy, Real};
use nalgebra::DVectorView;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

#[derive(Debug)]
pub struct Vector<T: DeviceCopy> {
    array: Array<T>,
}

impl<T: DeviceCopy> Deref for Vector<T> {
    type Target = Array<T>;

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl<T: DeviceCopy> DerefMut for Vector<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.array
    }
}

/// Prints the values eight per line, separated by spaces.
///
/// Device-resident contents are copied to the host for printing; the residency is unchanged.
impl<T: DeviceCopy + Default + Display> Display for Vector<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        const VALUES_PER_LINE: usize = 8;
        for (i, line) in self.array.snapshot().chunks(VALUES_PER_LINE).enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for (j, value) in line.iter().enumerate() {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", value)?;
            }
        }
        Ok(())
    }
}

impl<T: DeviceCopy> From<Array<T>> for Vector<T> {
    fn from(array: Array<T>) -> Self {
        Self { array }
    }
}

impl<T> Vector<T>
where
    T: Real + DeviceCopy + Default,
{
    pub fn new(runtime: &Runtime, layout: Layout) -> Self {
        Array::new(runtime, layout).into()
    }

    /// A zeroed scalar vector of length `len`.
    pub fn zeros(runtime: &Runtime, len: usize) -> Self {
        Self::new(runtime, Layout::scalar(len))
    }

    pub fn from_slice(runtime: &Runtime, layout: Layout, data: &[T]) -> Self {
        Array::from_slice(runtime, layout, data).into()
    }

    pub fn from_host(runtime: &Runtime, data: &[T]) -> Self {
        Array::from_host(runtime, data).into()
    }

    pub fn into_array(self) -> Array<T> {
        self.array
    }

    /// Returns a vector with the same layout and backend. Contents are copied if `copy_data` is
    /// set and zero otherwise.
    pub fn clone_vector(&self, copy_data: bool) -> Self {
        self.array.clone_array(copy_data).into()
    }

    /// Computes the inner product `self . other`.
    ///
    /// Reads both operands on their preferred residency. Host writes to a device vector are only
    /// seen after [`Array::sync_preferred`]; without residency checks, a stale device copy is
    /// used silently.
    pub fn dot(&self, other: &Self) -> T {
        self.check_compatible("Vector::dot", other);
        let (a, b) = (self.preferred_slice(), other.preferred_slice());
        with_executor!(self.policy(), |exec| exec.sum(a.len(), |i| a[i] * b[i]))
    }

    /// The Euclidean norm.
    pub fn norm(&self) -> T {
        self.dot(self).sqrt()
    }

    /// Sets `self = a * x + b * y`.
    ///
    /// Like [`Vector::dot`], the inputs are read on their preferred residency.
    pub fn axpby(&mut self, a: T, x: &Self, b: T, y: &Self) {
        self.check_compatible("Vector::axpby", x);
        self.check_compatible("Vector::axpby", y);
        let (x, y) = (x.preferred_slice(), y.preferred_slice());
        let policy = self.policy();
        let out = self.preferred_slice_for_overwrite();
        with_executor!(policy, |exec| exec.for_each_element(out, 1, |i, out_i| {
            out_i[0] = a * x[i] + b * y[i];
        }))
    }

    /// Sets `self = a * x + b * self`.
    ///
    /// Like [`Vector::dot`], the operands are read on their preferred residency.
    pub fn scale_add(&mut self, a: T, x: &Self, b: T) {
        self.check_compatible("Vector::scale_add", x);
        let x = x.preferred_slice();
        let policy = self.policy();
        let out = self.preferred_slice_mut();
        with_executor!(policy, |exec| exec.for_each_element(out, 1, |i, out_i| {
            out_i[0] = a * x[i] + b * out_i[0];
        }))
    }

    /// Sets `self = a * self`.
    pub fn scale(&mut self, a: T) {
        let policy = self.policy();
        let out = self.preferred_slice_mut();
        with_executor!(policy, |exec| exec.for_each_element(out, 1, |_, out_i| {
            out_i[0] *= a;
        }))
    }

    pub fn fill(&mut self, value: T) {
        let policy = self.policy();
        let out = self.preferred_slice_for_overwrite();
        with_executor!(policy, |exec| exec.for_each_element(out, 1, |_, out_i| {
            out_i[0] = value;
        }))
    }

    /// Sets the entries at `indices` to `value`, leaving all other entries untouched.
    ///
    /// Typically used to impose values on essential boundary degrees of freedom.
    pub fn set_sub_vector(&mut self, indices: &[usize], value: T) {
        let len = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            fatal(
                "Vector::set_sub_vector",
                format_args!("index {} is out of bounds for a vector of length {}", bad, len),
            );
        }
        let out = self.preferred_slice_mut();
        for &i in indices {
            out[i] = value;
        }
    }

    /// A host view of the contents, transferring from the device if necessary.
    pub fn as_dvector_view(&mut self) -> DVectorView<'_, T> {
        let data = self.host_view();
        DVectorView::from_slice(data, data.len())
    }

    fn check_compatible(&self, operation: &str, other: &Self) {
        if self.policy() != other.policy() {
            fatal(
                operation,
                format_args!(
                    "operands belong to different backends ({} and {})",
                    self.policy().backend,
                    other.policy().backend
                ),
            );
        }
        if self.len() != other.len() {
            fatal(
                operation,
                format_args!("operand lengths differ ({} and {})", self.len(), other.len()),
            );
        }
    }
}
