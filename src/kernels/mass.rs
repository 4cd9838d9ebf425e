//! Sum-factorized mass action, `y_e (+)= B^T diag(op_e) B x_e`.
//!
//! The tensor-product interpolation matrix is never formed. Instead `B` is applied one axis at
//! a time, which costs `O(D^dim Q)` rather than `O(D^dim Q^dim)` per element.
use super::{check_len, shape_or_fatal, ElementBatch, KernelShape};
use crate::basis::BasisTables;
use crate::error::{fatal, OrFatal};
use crate::executor::ElementExecutor;
use crate::launch::VariantKind;
use crate::workspace::with_thread_local_workspace;
use hofem_traits::Real;
use log::debug;

/// Computes `y += B^T diag(op) B x` element by element.
///
/// `x` and `y` hold `D^dim` values per element, `op` holds `Q^dim` values per element. The
/// accumulation into `y` is exclusive per element, so no two elements ever write the same entry.
///
/// # Panics
///
/// Aborts with a diagnostic if the dimension is not 2 or 3, if the basis sizes are out of range,
/// or if any buffer length does not match the batch.
pub fn mass_mult_add_with<T, E>(
    executor: &E,
    batch: ElementBatch,
    tables: &BasisTables<T>,
    op: &[T],
    x: &[T],
    y: &mut [T],
) where
    T: Real,
    E: ElementExecutor,
{
    dispatch("mass_mult_add", Accumulate::Add, executor, batch, tables, op, x, y)
}

/// Computes `y = B^T diag(op) B x` element by element.
///
/// Same as [`mass_mult_add_with`], except the previous contents of `y` are ignored.
pub fn mass_apply_with<T, E>(executor: &E, batch: ElementBatch, tables: &BasisTables<T>, op: &[T], x: &[T], y: &mut [T])
where
    T: Real,
    E: ElementExecutor,
{
    dispatch("mass_apply", Accumulate::Overwrite, executor, batch, tables, op, x, y)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Accumulate {
    Add,
    Overwrite,
}

/// Read-only per-launch data shared by all elements.
#[derive(Copy, Clone)]
struct MassArgs<'a, T> {
    d1d: usize,
    q1d: usize,
    b: &'a [T],
    bt: &'a [T],
    op: &'a [T],
    x: &'a [T],
    accumulate: Accumulate,
}

impl<'a, T: Real> MassArgs<'a, T> {
    fn element_op(&self, e: usize, quad_per_element: usize) -> &'a [T] {
        &self.op[e * quad_per_element..(e + 1) * quad_per_element]
    }

    fn element_x(&self, e: usize, dofs_per_element: usize) -> &'a [T] {
        &self.x[e * dofs_per_element..(e + 1) * dofs_per_element]
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch<T, E>(
    operation: &str,
    accumulate: Accumulate,
    executor: &E,
    batch: ElementBatch,
    tables: &BasisTables<T>,
    op: &[T],
    x: &[T],
    y: &mut [T],
) where
    T: Real,
    E: ElementExecutor,
{
    let shape = shape_or_fatal(operation, batch, tables);
    validate_lengths(&shape, op, x, y).or_fatal(operation);

    let variant = shape.variant;
    debug!(
        "{}: dim={}, D={}, Q={}, elements={}, backend={}, variant={:?}",
        operation,
        variant.dim,
        variant.dofs_1d,
        variant.quad_1d,
        shape.num_elements,
        executor.backend(),
        variant.kind
    );

    let args = MassArgs {
        d1d: variant.dofs_1d,
        q1d: variant.quad_1d,
        b: tables.dof_to_quad().as_slice(),
        bt: tables.quad_to_dof().as_slice(),
        op,
        x,
        accumulate,
    };

    let launched = match variant.kind {
        VariantKind::Specialized if variant.dim == 2 => launch_fixed_2d(executor, &args, y),
        VariantKind::Specialized => launch_fixed_3d(executor, &args, y),
        VariantKind::Generic => false,
    };
    if !launched {
        match variant.dim {
            2 => launch_generic_2d(executor, &args, y),
            3 => launch_generic_3d(executor, &args, y),
            dim => fatal(operation, format_args!("unsupported dimension {}", dim)),
        }
    }
}

fn validate_lengths<T>(shape: &KernelShape, op: &[T], x: &[T], y: &[T]) -> eyre::Result<()> {
    let nodal_len = shape.nodal_len()?;
    check_len("operator data", op.len(), shape.quadrature_len()?)?;
    check_len("input vector", x.len(), nodal_len)?;
    check_len("output vector", y.len(), nodal_len)
}

/// Scratch for one 2D element: a quadrature row, a dof row and the quadrature plane.
struct Scratch2d<'s, T> {
    xq: &'s mut [T],
    xd: &'s mut [T],
    xy: &'s mut [T],
}

/// Scratch for one 3D element.
struct Scratch3d<'s, T> {
    xq: &'s mut [T],
    xd: &'s mut [T],
    xy_q: &'s mut [T],
    xy_d: &'s mut [T],
    xyz: &'s mut [T],
}

#[inline(always)]
fn mass_element_2d<T: Real>(args: &MassArgs<'_, T>, op: &[T], x: &[T], y: &mut [T], s: Scratch2d<'_, T>) {
    let (d1d, q1d) = (args.d1d, args.q1d);
    let (b, bt) = (args.b, args.bt);
    let Scratch2d { xq, xd, xy } = s;

    if args.accumulate == Accumulate::Overwrite {
        y.fill(T::zero());
    }

    // Forward: contract x along dx, then along dy
    xy.fill(T::zero());
    for dy in 0..d1d {
        xq.fill(T::zero());
        for dx in 0..d1d {
            let v = x[dx + d1d * dy];
            for qx in 0..q1d {
                xq[qx] += b[qx + q1d * dx] * v;
            }
        }
        for qy in 0..q1d {
            let w = b[qy + q1d * dy];
            for qx in 0..q1d {
                xy[qx + q1d * qy] += w * xq[qx];
            }
        }
    }

    for (value, &weight) in xy.iter_mut().zip(op) {
        *value *= weight;
    }

    // Backward: contract along qx, then along qy
    for qy in 0..q1d {
        xd.fill(T::zero());
        for qx in 0..q1d {
            let v = xy[qx + q1d * qy];
            for dx in 0..d1d {
                xd[dx] += bt[dx + d1d * qx] * v;
            }
        }
        for dy in 0..d1d {
            let w = bt[dy + d1d * qy];
            for dx in 0..d1d {
                y[dx + d1d * dy] += w * xd[dx];
            }
        }
    }
}

#[inline(always)]
fn mass_element_3d<T: Real>(args: &MassArgs<'_, T>, op: &[T], x: &[T], y: &mut [T], s: Scratch3d<'_, T>) {
    let (d1d, q1d) = (args.d1d, args.q1d);
    let (b, bt) = (args.b, args.bt);
    let Scratch3d {
        xq,
        xd,
        xy_q,
        xy_d,
        xyz,
    } = s;

    if args.accumulate == Accumulate::Overwrite {
        y.fill(T::zero());
    }

    xyz.fill(T::zero());
    for dz in 0..d1d {
        xy_q.fill(T::zero());
        for dy in 0..d1d {
            xq.fill(T::zero());
            for dx in 0..d1d {
                let v = x[dx + d1d * (dy + d1d * dz)];
                for qx in 0..q1d {
                    xq[qx] += b[qx + q1d * dx] * v;
                }
            }
            for qy in 0..q1d {
                let w = b[qy + q1d * dy];
                for qx in 0..q1d {
                    xy_q[qx + q1d * qy] += w * xq[qx];
                }
            }
        }
        for qz in 0..q1d {
            let w = b[qz + q1d * dz];
            for qy in 0..q1d {
                for qx in 0..q1d {
                    xyz[qx + q1d * (qy + q1d * qz)] += w * xy_q[qx + q1d * qy];
                }
            }
        }
    }

    for (value, &weight) in xyz.iter_mut().zip(op) {
        *value *= weight;
    }

    for qz in 0..q1d {
        xy_d.fill(T::zero());
        for qy in 0..q1d {
            xd.fill(T::zero());
            for qx in 0..q1d {
                let v = xyz[qx + q1d * (qy + q1d * qz)];
                for dx in 0..d1d {
                    xd[dx] += bt[dx + d1d * qx] * v;
                }
            }
            for dy in 0..d1d {
                let w = bt[dy + d1d * qy];
                for dx in 0..d1d {
                    xy_d[dx + d1d * dy] += w * xd[dx];
                }
            }
        }
        for dz in 0..d1d {
            let w = bt[dz + d1d * qz];
            for dy in 0..d1d {
                for dx in 0..d1d {
                    y[dx + d1d * (dy + d1d * dz)] += w * xy_d[dx + d1d * dy];
                }
            }
        }
    }
}

fn mass_fixed_2d<T, E, const D: usize, const Q: usize>(executor: &E, args: &MassArgs<'_, T>, y: &mut [T])
where
    T: Real,
    E: ElementExecutor,
{
    executor.for_each_element(y, D * D, |e, y_e| {
        let mut xq = [T::zero(); Q];
        let mut xd = [T::zero(); D];
        let mut xy = [[T::zero(); Q]; Q];
        let scratch = Scratch2d {
            xq: &mut xq,
            xd: &mut xd,
            xy: xy.as_flattened_mut(),
        };
        mass_element_2d(args, args.element_op(e, Q * Q), args.element_x(e, D * D), y_e, scratch);
    });
}

fn mass_fixed_3d<T, E, const D: usize, const Q: usize>(executor: &E, args: &MassArgs<'_, T>, y: &mut [T])
where
    T: Real,
    E: ElementExecutor,
{
    executor.for_each_element(y, D * D * D, |e, y_e| {
        let mut xq = [T::zero(); Q];
        let mut xd = [T::zero(); D];
        let mut xy_q = [[T::zero(); Q]; Q];
        let mut xy_d = [[T::zero(); D]; D];
        let mut xyz = [[[T::zero(); Q]; Q]; Q];
        let scratch = Scratch3d {
            xq: &mut xq,
            xd: &mut xd,
            xy_q: xy_q.as_flattened_mut(),
            xy_d: xy_d.as_flattened_mut(),
            xyz: xyz.as_flattened_mut().as_flattened_mut(),
        };
        mass_element_3d(args, args.element_op(e, Q * Q * Q), args.element_x(e, D * D * D), y_e, scratch);
    });
}

/// Expands to a match over the instantiated `(D, Q)` pairs, evaluating to `true` when one of
/// them was launched.
macro_rules! launch_specialized {
    ($kernel:ident, $executor:expr, $args:expr, $y:expr; $(($d:literal, $q:literal)),* $(,)?) => {
        match ($args.d1d, $args.q1d) {
            $(
                ($d, $q) => {
                    $kernel::<T, E, $d, $q>($executor, $args, $y);
                    true
                }
            )*
            _ => false,
        }
    };
}

macro_rules! specialized_launcher {
    ($name:ident, $kernel:ident) => {
        fn $name<T: Real, E: ElementExecutor>(executor: &E, args: &MassArgs<'_, T>, y: &mut [T]) -> bool {
            launch_specialized!($kernel, executor, args, y;
                (1, 1), (1, 2), (1, 3),
                (2, 2), (2, 3), (2, 4),
                (3, 3), (3, 4), (3, 5),
                (4, 4), (4, 5), (4, 6),
                (5, 5), (5, 6), (5, 7),
                (6, 6), (6, 7), (6, 8),
            )
        }
    };
}

specialized_launcher!(launch_fixed_2d, mass_fixed_2d);
specialized_launcher!(launch_fixed_3d, mass_fixed_3d);

struct MassWorkspace<T> {
    xq: Vec<T>,
    xd: Vec<T>,
    xy_q: Vec<T>,
    xy_d: Vec<T>,
    xyz: Vec<T>,
}

impl<T> Default for MassWorkspace<T> {
    fn default() -> Self {
        Self {
            xq: Vec::new(),
            xd: Vec::new(),
            xy_q: Vec::new(),
            xy_d: Vec::new(),
            xyz: Vec::new(),
        }
    }
}

impl<T: Real> MassWorkspace<T> {
    fn prepare(&mut self, dim: usize, d1d: usize, q1d: usize) {
        self.xq.resize(q1d, T::zero());
        self.xd.resize(d1d, T::zero());
        self.xy_q.resize(q1d * q1d, T::zero());
        if dim == 3 {
            self.xy_d.resize(d1d * d1d, T::zero());
            self.xyz.resize(q1d * q1d * q1d, T::zero());
        }
    }
}

fn launch_generic_2d<T: Real, E: ElementExecutor>(executor: &E, args: &MassArgs<'_, T>, y: &mut [T]) {
    let (nd, nq) = (args.d1d * args.d1d, args.q1d * args.q1d);
    executor.for_each_element(y, nd, |e, y_e| {
        with_thread_local_workspace(|ws: &mut MassWorkspace<T>| {
            ws.prepare(2, args.d1d, args.q1d);
            let scratch = Scratch2d {
                xq: &mut ws.xq,
                xd: &mut ws.xd,
                xy: &mut ws.xy_q,
            };
            mass_element_2d(args, args.element_op(e, nq), args.element_x(e, nd), y_e, scratch);
        })
    });
}

fn launch_generic_3d<T: Real, E: ElementExecutor>(executor: &E, args: &MassArgs<'_, T>, y: &mut [T]) {
    let nd = args.d1d * args.d1d * args.d1d;
    let nq = args.q1d * args.q1d * args.q1d;
    executor.for_each_element(y, nd, |e, y_e| {
        with_thread_local_workspace(|ws: &mut MassWorkspace<T>| {
            ws.prepare(3, args.d1d, args.q1d);
            let scratch = Scratch3d {
                xq: &mut ws.xq,
                xd: &mut ws.xd,
                xy_q: &mut ws.xy_q,
                xy_d: &mut ws.xy_d,
                xyz: &mut ws.xyz,
            };
            mass_element_3d(args, args.element_op(e, nq), args.element_x(e, nd), y_e, scratch);
        })
    });
}
