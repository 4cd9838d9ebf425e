use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used by all numerical kernels.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Marker for plain-old-data types that may be moved to and from device memory.
///
/// Transfers copy values with `Copy`, so implementors should not hold references or pointers
/// whose meaning depends on the address space the value lives in.
pub trait DeviceCopy: Copy + Send + Sync + 'static {}

macro_rules! impl_device_copy {
    ($($t:ty),*) => {
        $(impl DeviceCopy for $t {})*
    };
}

impl_device_copy!(f32, f64, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
