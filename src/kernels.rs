//! Element-local tensor-product kernels.
//!
//! All kernels operate on E-vectors, where every element owns a contiguous block of values:
//!
//! | data                | values per element | index within the batch                     |
//! |---------------------|--------------------|--------------------------------------------|
//! | nodal values `x, y` | `D^dim`            | `dx + D*(dy + D*(dz + D*e))`               |
//! | `op`, interpolated  | `Q^dim`            | `qx + Q*(qy + Q*(qz + Q*e))`               |
//! | gradients           | `dim * Q^dim`      | `c + dim*(qx + Q*(qy + Q*(qz + Q*e)))`     |
//!
//! Each entry point comes in two forms. The `*_with` functions take raw slices and an explicit
//! [`ElementExecutor`]. The vector-level functions take [`Vector`]s created by the same
//! [`Runtime`], read their preferred residency and select the executor from the runtime's
//! backend. Either way, invalid arguments are fatal: there is no partial result to return.
use crate::basis::BasisTables;
use crate::config::{ExecutionPolicy, Runtime};
use crate::error::{fatal, OrFatal};
use crate::executor::describe;
use crate::launch::{checked_len, KernelVariant};
use crate::vector::Vector;
use crate::with_executor;
use eyre::ensure;
use hofem_traits::{DeviceCopy, Real};

mod interpolate;
mod mass;

pub use interpolate::{gradient_with, interpolate_with};
pub use mass::{mass_apply_with, mass_mult_add_with};

/// A batch of elements of one spatial dimension sharing one basis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ElementBatch {
    pub dim: usize,
    pub num_elements: usize,
}

impl ElementBatch {
    pub fn new(dim: usize, num_elements: usize) -> Self {
        Self { dim, num_elements }
    }
}

/// Sizes derived from a batch and its basis tables after validation.
#[derive(Debug, Copy, Clone)]
pub(crate) struct KernelShape {
    pub variant: KernelVariant,
    pub num_elements: usize,
    pub dofs_per_element: usize,
    pub quad_per_element: usize,
}

impl KernelShape {
    pub(crate) fn new<T: Real>(batch: ElementBatch, tables: &BasisTables<T>) -> eyre::Result<Self> {
        let variant = KernelVariant::select(batch.dim, tables.dofs_1d(), tables.quad_1d())?;
        Ok(Self {
            variant,
            num_elements: batch.num_elements,
            dofs_per_element: variant.dofs_per_element(),
            quad_per_element: variant.quad_per_element(),
        })
    }

    pub(crate) fn dim(&self) -> usize {
        self.variant.dim
    }

    pub(crate) fn nodal_len(&self) -> eyre::Result<usize> {
        checked_len(self.num_elements, self.dofs_per_element, "nodal vector")
    }

    pub(crate) fn quadrature_len(&self) -> eyre::Result<usize> {
        checked_len(self.num_elements, self.quad_per_element, "quadrature data")
    }

    pub(crate) fn gradient_len(&self) -> eyre::Result<usize> {
        let per_element = checked_len(self.dim(), self.quad_per_element, "gradient")?;
        checked_len(self.num_elements, per_element, "gradient")
    }
}

pub(crate) fn check_len(what: &str, actual: usize, expected: usize) -> eyre::Result<()> {
    ensure!(
        actual == expected,
        "{} has length {} but {} was expected",
        what,
        actual,
        expected
    );
    Ok(())
}

fn check_policies(operation: &str, runtime: &Runtime, policies: &[ExecutionPolicy]) {
    let expected = runtime.policy();
    if let Some(mismatch) = policies.iter().find(|&&p| p != expected) {
        fatal(
            operation,
            format_args!(
                "buffer was created for the {} backend but the runtime dispatches on {}",
                describe(*mismatch),
                describe(expected)
            ),
        );
    }
}

/// `y += B^T diag(op) B x` on every element.
pub fn mass_mult_add<T>(
    runtime: &Runtime,
    batch: ElementBatch,
    tables: &BasisTables<T>,
    op: &Vector<T>,
    x: &Vector<T>,
    y: &mut Vector<T>,
) where
    T: Real + DeviceCopy + Default,
{
    check_policies("mass_mult_add", runtime, &[op.policy(), x.policy(), y.policy()]);
    let (op, x, y) = (op.preferred_slice(), x.preferred_slice(), y.preferred_slice_mut());
    with_executor!(runtime.policy(), |exec| mass_mult_add_with(exec, batch, tables, op, x, y))
}

/// `y = B^T diag(op) B x` on every element.
pub fn mass_apply<T>(
    runtime: &Runtime,
    batch: ElementBatch,
    tables: &BasisTables<T>,
    op: &Vector<T>,
    x: &Vector<T>,
    y: &mut Vector<T>,
) where
    T: Real + DeviceCopy + Default,
{
    check_policies("mass_apply", runtime, &[op.policy(), x.policy(), y.policy()]);
    let (op, x, y) = (op.preferred_slice(), x.preferred_slice(), y.preferred_slice_for_overwrite());
    with_executor!(runtime.policy(), |exec| mass_apply_with(exec, batch, tables, op, x, y))
}

/// Values at quadrature points, `B x` on every element.
pub fn interpolate<T>(
    runtime: &Runtime,
    batch: ElementBatch,
    tables: &BasisTables<T>,
    x: &Vector<T>,
    values: &mut Vector<T>,
) where
    T: Real + DeviceCopy + Default,
{
    check_policies("interpolate", runtime, &[x.policy(), values.policy()]);
    let (x, values) = (x.preferred_slice(), values.preferred_slice_for_overwrite());
    with_executor!(runtime.policy(), |exec| interpolate_with(exec, batch, tables, x, values))
}

/// Reference-space gradients at quadrature points on every element.
pub fn gradient<T>(
    runtime: &Runtime,
    batch: ElementBatch,
    tables: &BasisTables<T>,
    x: &Vector<T>,
    gradients: &mut Vector<T>,
) where
    T: Real + DeviceCopy + Default,
{
    check_policies("gradient", runtime, &[x.policy(), gradients.policy()]);
    let (x, gradients) = (x.preferred_slice(), gradients.preferred_slice_for_overwrite());
    with_executor!(runtime.policy(), |exec| gradient_with(exec, batch, tables, x, gradients))
}

/// Validates a batch against its tables, aborting on failure.
pub(crate) fn shape_or_fatal<T: Real>(operation: &str, batch: ElementBatch, tables: &BasisTables<T>) -> KernelShape {
    KernelShape::new(batch, tables).or_fatal(operation)
}
