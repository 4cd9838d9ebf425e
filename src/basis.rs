//! Tensor-product basis operator tables.
//!
//! A [`BasisTables`] holds the one-dimensional matrices that map nodal values to quadrature
//! point values (`dof_to_quad`, `Q x D`) and back (`quad_to_dof`, `D x Q`), together with the
//! derivative counterparts. The tables are read-only once built and are shared by every kernel
//! invocation for a given basis order.
use crate::quadrature::{gauss_legendre, gauss_lobatto_points};
use eyre::ensure;
use hofem_traits::Real;
use nalgebra::{convert, DMatrix};

#[derive(Debug, Clone, PartialEq)]
pub struct BasisTables<T: Real> {
    dof_to_quad: DMatrix<T>,
    dof_to_quad_d: DMatrix<T>,
    quad_to_dof: DMatrix<T>,
    quad_to_dof_d: DMatrix<T>,
}

impl<T: Real> BasisTables<T> {
    /// Builds tables from the `Q x D` interpolation matrix and its derivative.
    ///
    /// The backward tables are the transposes.
    pub fn new(dof_to_quad: DMatrix<T>, dof_to_quad_d: DMatrix<T>) -> eyre::Result<Self> {
        ensure!(
            dof_to_quad.shape() == dof_to_quad_d.shape(),
            "interpolation table has shape {:?} but derivative table has shape {:?}",
            dof_to_quad.shape(),
            dof_to_quad_d.shape()
        );
        ensure!(
            dof_to_quad.nrows() > 0 && dof_to_quad.ncols() > 0,
            "basis tables must be non-empty"
        );
        let quad_to_dof = dof_to_quad.transpose();
        let quad_to_dof_d = dof_to_quad_d.transpose();
        Ok(Self {
            dof_to_quad,
            dof_to_quad_d,
            quad_to_dof,
            quad_to_dof_d,
        })
    }

    /// Lagrange polynomials on the Gauss-Lobatto nodes of `[0, 1]`, evaluated at the
    /// Gauss-Legendre points of `[0, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if either size is zero.
    pub fn lagrange(dofs_1d: usize, quad_1d: usize) -> Self {
        let nodes = gauss_lobatto_points(dofs_1d);
        let (_, points) = gauss_legendre(quad_1d);

        let values = DMatrix::from_fn(quad_1d, dofs_1d, |q, j| convert(lagrange_value(&nodes, j, points[q])));
        let derivatives = DMatrix::from_fn(quad_1d, dofs_1d, |q, j| convert(lagrange_derivative(&nodes, j, points[q])));
        Self {
            quad_to_dof: values.transpose(),
            quad_to_dof_d: derivatives.transpose(),
            dof_to_quad: values,
            dof_to_quad_d: derivatives,
        }
    }

    /// Number of degrees of freedom per dimension, `D`.
    pub fn dofs_1d(&self) -> usize {
        self.dof_to_quad.ncols()
    }

    /// Number of quadrature points per dimension, `Q`.
    pub fn quad_1d(&self) -> usize {
        self.dof_to_quad.nrows()
    }

    pub fn dof_to_quad(&self) -> &DMatrix<T> {
        &self.dof_to_quad
    }

    pub fn dof_to_quad_d(&self) -> &DMatrix<T> {
        &self.dof_to_quad_d
    }

    pub fn quad_to_dof(&self) -> &DMatrix<T> {
        &self.quad_to_dof
    }

    pub fn quad_to_dof_d(&self) -> &DMatrix<T> {
        &self.quad_to_dof_d
    }
}

fn lagrange_value(nodes: &[f64], j: usize, x: f64) -> f64 {
    nodes
        .iter()
        .enumerate()
        .filter(|&(m, _)| m != j)
        .map(|(_, &x_m)| (x - x_m) / (nodes[j] - x_m))
        .product()
}

fn lagrange_derivative(nodes: &[f64], j: usize, x: f64) -> f64 {
    let x_j = nodes[j];
    (0..nodes.len())
        .filter(|&k| k != j)
        .map(|k| {
            let rest: f64 = (0..nodes.len())
                .filter(|&m| m != j && m != k)
                .map(|m| (x - nodes[m]) / (x_j - nodes[m]))
                .product();
            rest / (x_j - nodes[k])
        })
        .sum()
}
