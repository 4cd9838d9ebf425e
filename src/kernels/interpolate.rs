//! Evaluation of nodal values and reference gradients at quadrature points.
use super::{check_len, shape_or_fatal, ElementBatch, KernelShape};
use crate::basis::BasisTables;
use crate::error::{fatal, OrFatal};
use crate::executor::ElementExecutor;
use crate::workspace::with_thread_local_workspace;
use hofem_traits::Real;
use log::debug;

/// Computes `values = B x` element by element, `Q^dim` values per element.
///
/// # Panics
///
/// Aborts with a diagnostic on an unsupported dimension or mismatched buffer lengths.
pub fn interpolate_with<T, E>(executor: &E, batch: ElementBatch, tables: &BasisTables<T>, x: &[T], values: &mut [T])
where
    T: Real,
    E: ElementExecutor,
{
    let operation = "interpolate";
    let shape = shape_or_fatal(operation, batch, tables);
    validate(&shape, x, values.len(), shape.quadrature_len()).or_fatal(operation);
    log_launch(operation, &shape, executor);

    let args = InterpolationArgs::new(&shape, tables, x);
    let nq = shape.quad_per_element;
    executor.for_each_element(values, nq, |e, out| {
        with_thread_local_workspace(|ws: &mut InterpolationWorkspace<T>| {
            ws.prepare(args.q1d);
            match args.dim {
                2 => values_2d(&args, args.element_x(e), out, ws),
                3 => values_3d(&args, args.element_x(e), out, ws),
                dim => fatal(operation, format_args!("unsupported dimension {}", dim)),
            }
        })
    });
}

/// Computes reference-space gradients element by element.
///
/// The output holds `dim` components per quadrature point, with the component index fastest:
/// entry `c + dim * q` of an element is the derivative along axis `c` at point `q`.
pub fn gradient_with<T, E>(executor: &E, batch: ElementBatch, tables: &BasisTables<T>, x: &[T], gradients: &mut [T])
where
    T: Real,
    E: ElementExecutor,
{
    let operation = "gradient";
    let shape = shape_or_fatal(operation, batch, tables);
    validate(&shape, x, gradients.len(), shape.gradient_len()).or_fatal(operation);
    log_launch(operation, &shape, executor);

    let args = InterpolationArgs::new(&shape, tables, x);
    let chunk = shape.dim() * shape.quad_per_element;
    executor.for_each_element(gradients, chunk, |e, out| {
        with_thread_local_workspace(|ws: &mut InterpolationWorkspace<T>| {
            ws.prepare(args.q1d);
            match args.dim {
                2 => gradient_2d(&args, args.element_x(e), out, ws),
                3 => gradient_3d(&args, args.element_x(e), out, ws),
                dim => fatal(operation, format_args!("unsupported dimension {}", dim)),
            }
        })
    });
}

fn validate<T>(shape: &KernelShape, x: &[T], output_len: usize, expected: eyre::Result<usize>) -> eyre::Result<()> {
    check_len("input vector", x.len(), shape.nodal_len()?)?;
    check_len("output vector", output_len, expected?)
}

fn log_launch<E: ElementExecutor>(operation: &str, shape: &KernelShape, executor: &E) {
    let variant = shape.variant;
    debug!(
        "{}: dim={}, D={}, Q={}, elements={}, backend={}",
        operation,
        variant.dim,
        variant.dofs_1d,
        variant.quad_1d,
        shape.num_elements,
        executor.backend()
    );
}

struct InterpolationArgs<'a, T> {
    dim: usize,
    d1d: usize,
    q1d: usize,
    dofs_per_element: usize,
    b: &'a [T],
    g: &'a [T],
    x: &'a [T],
}

impl<'a, T: Real> InterpolationArgs<'a, T> {
    fn new(shape: &KernelShape, tables: &'a BasisTables<T>, x: &'a [T]) -> Self {
        Self {
            dim: shape.dim(),
            d1d: shape.variant.dofs_1d,
            q1d: shape.variant.quad_1d,
            dofs_per_element: shape.dofs_per_element,
            b: tables.dof_to_quad().as_slice(),
            g: tables.dof_to_quad_d().as_slice(),
            x,
        }
    }

    fn element_x(&self, e: usize) -> &'a [T] {
        let n = self.dofs_per_element;
        &self.x[e * n..(e + 1) * n]
    }
}

/// Per-thread scratch: two quadrature rows and three quadrature planes.
struct InterpolationWorkspace<T> {
    bx: Vec<T>,
    gx: Vec<T>,
    plane_a: Vec<T>,
    plane_b: Vec<T>,
    plane_c: Vec<T>,
}

impl<T> Default for InterpolationWorkspace<T> {
    fn default() -> Self {
        Self {
            bx: Vec::new(),
            gx: Vec::new(),
            plane_a: Vec::new(),
            plane_b: Vec::new(),
            plane_c: Vec::new(),
        }
    }
}

impl<T: Real> InterpolationWorkspace<T> {
    fn prepare(&mut self, q1d: usize) {
        self.bx.resize(q1d, T::zero());
        self.gx.resize(q1d, T::zero());
        self.plane_a.resize(q1d * q1d, T::zero());
        self.plane_b.resize(q1d * q1d, T::zero());
        self.plane_c.resize(q1d * q1d, T::zero());
    }
}

/// Contracts one row of nodal values along x, with `B` into `bx` and, if requested, with `G`
/// into `gx`.
#[inline(always)]
fn contract_row<T: Real>(args: &InterpolationArgs<'_, T>, row: &[T], bx: &mut [T], gx: Option<&mut [T]>) {
    let (b, g, q1d) = (args.b, args.g, args.q1d);
    bx.fill(T::zero());
    for (dx, &v) in row.iter().enumerate() {
        for qx in 0..q1d {
            bx[qx] += b[qx + q1d * dx] * v;
        }
    }
    if let Some(gx) = gx {
        gx.fill(T::zero());
        for (dx, &v) in row.iter().enumerate() {
            for qx in 0..q1d {
                gx[qx] += g[qx + q1d * dx] * v;
            }
        }
    }
}

fn values_2d<T: Real>(args: &InterpolationArgs<'_, T>, x: &[T], out: &mut [T], ws: &mut InterpolationWorkspace<T>) {
    let (d1d, q1d, b) = (args.d1d, args.q1d, args.b);
    out.fill(T::zero());
    for dy in 0..d1d {
        contract_row(args, &x[d1d * dy..d1d * (dy + 1)], &mut ws.bx, None);
        for qy in 0..q1d {
            let w = b[qy + q1d * dy];
            for qx in 0..q1d {
                out[qx + q1d * qy] += w * ws.bx[qx];
            }
        }
    }
}

fn values_3d<T: Real>(args: &InterpolationArgs<'_, T>, x: &[T], out: &mut [T], ws: &mut InterpolationWorkspace<T>) {
    let (d1d, q1d, b) = (args.d1d, args.q1d, args.b);
    out.fill(T::zero());
    for dz in 0..d1d {
        let plane = &mut ws.plane_a;
        plane.fill(T::zero());
        for dy in 0..d1d {
            let start = d1d * (dy + d1d * dz);
            contract_row(args, &x[start..start + d1d], &mut ws.bx, None);
            for qy in 0..q1d {
                let w = b[qy + q1d * dy];
                for qx in 0..q1d {
                    plane[qx + q1d * qy] += w * ws.bx[qx];
                }
            }
        }
        for qz in 0..q1d {
            let w = b[qz + q1d * dz];
            for (q, &v) in plane.iter().enumerate() {
                out[q + q1d * q1d * qz] += w * v;
            }
        }
    }
}

fn gradient_2d<T: Real>(args: &InterpolationArgs<'_, T>, x: &[T], out: &mut [T], ws: &mut InterpolationWorkspace<T>) {
    let (d1d, q1d, b, g) = (args.d1d, args.q1d, args.b, args.g);
    out.fill(T::zero());
    for dy in 0..d1d {
        contract_row(args, &x[d1d * dy..d1d * (dy + 1)], &mut ws.bx, Some(ws.gx.as_mut_slice()));
        for qy in 0..q1d {
            let (wy, dwy) = (b[qy + q1d * dy], g[qy + q1d * dy]);
            for qx in 0..q1d {
                let q = qx + q1d * qy;
                out[2 * q] += ws.gx[qx] * wy;
                out[2 * q + 1] += ws.bx[qx] * dwy;
            }
        }
    }
}

fn gradient_3d<T: Real>(args: &InterpolationArgs<'_, T>, x: &[T], out: &mut [T], ws: &mut InterpolationWorkspace<T>) {
    let (d1d, q1d, b, g) = (args.d1d, args.q1d, args.b, args.g);
    out.fill(T::zero());
    for dz in 0..d1d {
        // Partial sums over (dx, dy): G_x B_y, B_x G_y and B_x B_y
        ws.plane_a.fill(T::zero());
        ws.plane_b.fill(T::zero());
        ws.plane_c.fill(T::zero());
        for dy in 0..d1d {
            let start = d1d * (dy + d1d * dz);
            contract_row(args, &x[start..start + d1d], &mut ws.bx, Some(ws.gx.as_mut_slice()));
            for qy in 0..q1d {
                let (wy, dwy) = (b[qy + q1d * dy], g[qy + q1d * dy]);
                for qx in 0..q1d {
                    let q = qx + q1d * qy;
                    ws.plane_a[q] += ws.gx[qx] * wy;
                    ws.plane_b[q] += ws.bx[qx] * dwy;
                    ws.plane_c[q] += ws.bx[qx] * wy;
                }
            }
        }
        for qz in 0..q1d {
            let (wz, dwz) = (b[qz + q1d * dz], g[qz + q1d * dz]);
            for q in 0..q1d * q1d {
                let p = 3 * (q + q1d * q1d * qz);
                out[p] += ws.plane_a[q] * wz;
                out[p + 1] += ws.plane_b[q] * wz;
                out[p + 2] += ws.plane_c[q] * dwz;
            }
        }
    }
}
