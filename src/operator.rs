//! Solver-facing operator interface.
use crate::basis::BasisTables;
use crate::config::Runtime;
use crate::error::OrFatal;
use crate::kernels::{check_len, mass_apply, mass_mult_add, ElementBatch, KernelShape};
use crate::quadrature::tensor_weights;
use crate::vector::Vector;
use eyre::{ensure, WrapErr};
use hofem_traits::{DeviceCopy, Real};
use itertools::repeat_n;
use log::debug;
use nalgebra::convert;
use std::sync::Arc;

/// A square linear operator acting on backend vectors.
pub trait LinearOperator<T: DeviceCopy> {
    fn num_rows(&self) -> usize;

    /// Computes `y = A x`.
    fn apply(&self, x: &Vector<T>, y: &mut Vector<T>);

    /// Computes `y += A x`.
    fn apply_add(&self, x: &Vector<T>, y: &mut Vector<T>);
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: DeviceCopy,
    A: ?Sized + LinearOperator<T>,
{
    fn num_rows(&self) -> usize {
        <A as LinearOperator<T>>::num_rows(self)
    }

    fn apply(&self, x: &Vector<T>, y: &mut Vector<T>) {
        <A as LinearOperator<T>>::apply(self, x, y)
    }

    fn apply_add(&self, x: &Vector<T>, y: &mut Vector<T>) {
        <A as LinearOperator<T>>::apply_add(self, x, y)
    }
}

/// The element-local mass operator `B^T diag(op) B` of a batch of elements.
///
/// Owns the per-element quadrature data, so dropping the operator releases its device memory.
/// The basis tables are shared with any other operator of the same order.
#[derive(Debug)]
pub struct MassOperator<'rt, T: Real + DeviceCopy + Default> {
    runtime: &'rt Runtime,
    batch: ElementBatch,
    tables: Arc<BasisTables<T>>,
    op: Vector<T>,
    num_rows: usize,
}

impl<'rt, T> MassOperator<'rt, T>
where
    T: Real + DeviceCopy + Default,
{
    /// # Panics
    ///
    /// Aborts with a diagnostic if `op` does not match the batch, or was created by a runtime
    /// with a different backend.
    pub fn new(
        runtime: &'rt Runtime,
        dim: usize,
        num_elements: usize,
        tables: Arc<BasisTables<T>>,
        op: Vector<T>,
    ) -> Self {
        Self::try_new(runtime, dim, num_elements, tables, op).or_fatal("MassOperator::new")
    }

    pub fn try_new(
        runtime: &'rt Runtime,
        dim: usize,
        num_elements: usize,
        tables: Arc<BasisTables<T>>,
        op: Vector<T>,
    ) -> eyre::Result<Self> {
        let batch = ElementBatch::new(dim, num_elements);
        let shape = KernelShape::new(batch, &tables).wrap_err("invalid mass operator shape")?;
        check_len("operator data", op.len(), shape.quadrature_len()?)?;
        ensure!(
            op.policy() == runtime.policy(),
            "operator data belongs to the {} backend but the runtime uses {}",
            op.policy().backend,
            runtime.backend()
        );
        let num_rows = shape.nodal_len()?;
        debug!(
            "Created mass operator: dim={}, D={}, Q={}, elements={}, rows={}",
            dim,
            tables.dofs_1d(),
            tables.quad_1d(),
            num_elements,
            num_rows
        );
        Ok(Self {
            runtime,
            batch,
            tables,
            op,
            num_rows,
        })
    }

    /// A mass operator for elements that are unit cubes in reference coordinates, with `op`
    /// holding the Gauss-Legendre tensor weights of every element.
    pub fn with_reference_weights(
        runtime: &'rt Runtime,
        dim: usize,
        num_elements: usize,
        tables: Arc<BasisTables<T>>,
    ) -> Self {
        let weights: Vec<T> = tensor_weights(dim, tables.quad_1d())
            .into_iter()
            .map(convert)
            .collect();
        let data: Vec<T> = repeat_n(&weights, num_elements)
            .flatten()
            .copied()
            .collect();
        let op = Vector::from_host(runtime, &data);
        Self::new(runtime, dim, num_elements, tables, op)
    }

    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }

    pub fn dim(&self) -> usize {
        self.batch.dim
    }

    pub fn num_elements(&self) -> usize {
        self.batch.num_elements
    }

    pub fn tables(&self) -> &Arc<BasisTables<T>> {
        &self.tables
    }

    pub fn op(&self) -> &Vector<T> {
        &self.op
    }
}

impl<'rt, T> LinearOperator<T> for MassOperator<'rt, T>
where
    T: Real + DeviceCopy + Default,
{
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn apply(&self, x: &Vector<T>, y: &mut Vector<T>) {
        mass_apply(self.runtime, self.batch, &self.tables, &self.op, x, y)
    }

    fn apply_add(&self, x: &Vector<T>, y: &mut Vector<T>) {
        mass_mult_add(self.runtime, self.batch, &self.tables, &self.op, x, y)
    }
}
