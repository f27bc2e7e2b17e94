//! Heat-method geodesic distance.
//!
//! Three stages per source, following Crane, Weischedel and Wardetzky,
//! "The Heat Method for Distance Computation":
//!
//! ```text
//! 1. (M + t L) u = M δ           diffuse heat from the source for time t
//! 2. X = -∇u / |∇u|              per face, unit field pointing away from the source
//! 3. (L + ε M) φ = -∇·X          recover the potential whose gradient best fits X
//! ```
//!
//! `L` is the cotangent Laplacian in its positive semi-definite form and `M`
//! the lumped (one third of incident area) mass matrix. Everything that does
//! not depend on the source is assembled once in [`HeatOperator::build`];
//! both systems are solved with Jacobi-preconditioned conjugate gradient.

use crate::distance::DistanceField;
use crate::error::{GeodesicError, GeodesicResult};
use crate::geometry::SurfaceGeometry;
use crate::params::SurfaceParams;
use nalgebra::{DVector, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// `ln` of the smallest heat ratio, relative to the source, that the far side
/// of the mesh may decay to. Below roughly this level the iterative solve's
/// residual swamps the diffused signal and gradient directions turn to noise.
const FAR_FIELD_DECAY: f64 = 23.0;

/// Poisson regularization relative to the mean Laplacian diagonal.
const POISSON_SHIFT: f64 = 1e-8;

/// Outcome of one conjugate gradient solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Iterations performed.
    pub iterations: usize,
    /// Final residual norm relative to the right-hand side.
    pub relative_residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// Symmetric positive definite sparse system with its Jacobi preconditioner.
#[derive(Debug, Clone)]
struct SparseSystem {
    matrix: CsrMatrix<f64>,
    inv_diagonal: DVector<f64>,
}

impl SparseSystem {
    fn from_coo(coo: &CooMatrix<f64>) -> Self {
        let matrix = CsrMatrix::from(coo);
        let mut inv_diagonal = DVector::from_element(matrix.nrows(), 1.0);
        for (row_idx, row) in matrix.row_iter().enumerate() {
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                if col_idx == row_idx && val.abs() > f64::MIN_POSITIVE {
                    inv_diagonal[row_idx] = 1.0 / val;
                }
            }
        }
        Self {
            matrix,
            inv_diagonal,
        }
    }

    fn mul_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut result = DVector::zeros(self.matrix.nrows());
        for (row_idx, row) in self.matrix.row_iter().enumerate() {
            let mut sum = 0.0;
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                sum += val * v[col_idx];
            }
            result[row_idx] = sum;
        }
        result
    }

    /// Preconditioned conjugate gradient from a zero initial guess.
    #[allow(clippy::many_single_char_names)]
    fn solve(
        &self,
        b: &DVector<f64>,
        tolerance: f64,
        max_iterations: usize,
    ) -> (DVector<f64>, SolveReport) {
        let mut x = DVector::zeros(b.len());
        let b_norm = b.norm();
        if b_norm < f64::MIN_POSITIVE {
            return (
                x,
                SolveReport {
                    iterations: 0,
                    relative_residual: 0.0,
                    converged: true,
                },
            );
        }

        let mut r = b.clone();
        let mut z = r.component_mul(&self.inv_diagonal);
        let mut p = z.clone();
        let mut r_dot_z = r.dot(&z);
        let mut iterations = 0;
        let mut converged = false;

        for k in 0..max_iterations {
            iterations = k + 1;
            let ap = self.mul_vec(&p);
            let p_dot_ap = p.dot(&ap);
            if p_dot_ap.abs() < 1e-300 {
                break;
            }
            let alpha = r_dot_z / p_dot_ap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);

            if r.norm() / b_norm < tolerance {
                converged = true;
                break;
            }

            z = r.component_mul(&self.inv_diagonal);
            let r_dot_z_new = r.dot(&z);
            let beta = r_dot_z_new / r_dot_z;
            r_dot_z = r_dot_z_new;
            p = &z + beta * &p;
        }

        let relative_residual = r.norm() / b_norm;
        (
            x,
            SolveReport {
                iterations,
                relative_residual,
                converged,
            },
        )
    }
}

/// Source-independent part of the heat method for one mesh.
#[derive(Debug, Clone)]
pub struct HeatOperator {
    heat: SparseSystem,
    poisson: SparseSystem,
    mass: DVector<f64>,
    /// Cotangent of the interior angle at each corner of each face.
    cotangents: Vec<[f64; 3]>,
    time_step: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl HeatOperator {
    /// Assemble the Laplacian, mass matrix and both solver systems.
    #[must_use]
    pub fn build(geometry: &SurfaceGeometry, params: &SurfaceParams) -> Self {
        let start = std::time::Instant::now();
        let n = geometry.vertex_count();

        let cotangents: Vec<[f64; 3]> = (0..geometry.face_count())
            .map(|f| corner_cotangents(geometry, f))
            .collect();

        let mut mass = DVector::<f64>::zeros(n);
        for f in 0..geometry.face_count() {
            let third = geometry.face_area(f) / 3.0;
            for v in geometry.face(f) {
                mass[v as usize] += third;
            }
        }

        // (row, col, weight) of the Laplacian, duplicates summed on conversion
        let mut laplacian: Vec<(usize, usize, f64)> = Vec::with_capacity(geometry.face_count() * 12);
        let mut diagonal_sum = 0.0;
        for (f, cot) in cotangents.iter().enumerate() {
            let face = geometry.face(f);
            for corner in 0..3 {
                let i = face[(corner + 1) % 3] as usize;
                let j = face[(corner + 2) % 3] as usize;
                let w = 0.5 * cot[corner];
                laplacian.push((i, j, -w));
                laplacian.push((j, i, -w));
                laplacian.push((i, i, w));
                laplacian.push((j, j, w));
                diagonal_sum += 2.0 * w;
            }
        }

        let h = geometry.mean_edge_length();
        let extent = geometry.bounds().diagonal();
        let time_step = (params.heat_time_factor * h * h).max(extent * extent / (4.0 * FAR_FIELD_DECAY));

        #[allow(clippy::cast_precision_loss)]
        let shift = {
            let mean_diag = diagonal_sum / n as f64;
            let mean_mass = mass.sum() / n as f64;
            if mean_mass > 0.0 {
                POISSON_SHIFT * mean_diag / mean_mass
            } else {
                POISSON_SHIFT
            }
        };

        let mut heat = CooMatrix::new(n, n);
        let mut poisson = CooMatrix::new(n, n);
        for (i, &m) in mass.iter().enumerate() {
            heat.push(i, i, m);
            poisson.push(i, i, shift * m);
        }
        for &(i, j, w) in &laplacian {
            heat.push(i, j, time_step * w);
            poisson.push(i, j, w);
        }

        let operator = Self {
            heat: SparseSystem::from_coo(&heat),
            poisson: SparseSystem::from_coo(&poisson),
            mass,
            cotangents,
            time_step,
            tolerance: params.solver_tolerance,
            max_iterations: params.solver_max_iterations,
        };

        info!(
            vertices = n,
            faces = geometry.face_count(),
            nnz = operator.heat.matrix.nnz(),
            time_step,
            elapsed_ms = start.elapsed().as_millis(),
            "Built heat method operator"
        );

        operator
    }

    /// Diffusion time used for the heat step.
    #[inline]
    #[must_use]
    pub const fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Number of vertices the operator was built for.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.mass.len()
    }

    /// Distances from a single vertex to every vertex.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::InvalidVertex`] if `source` is out of range.
    pub fn distance_from_vertex(
        &self,
        geometry: &SurfaceGeometry,
        source: usize,
    ) -> GeodesicResult<DistanceField> {
        self.distance_from_vertices(geometry, &[source])
    }

    /// Distances from the nearest of several source vertices.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesicError::InvalidVertex`] if any source is out of range
    /// or the source list is empty.
    pub fn distance_from_vertices(
        &self,
        geometry: &SurfaceGeometry,
        sources: &[usize],
    ) -> GeodesicResult<DistanceField> {
        let n = self.vertex_count();
        if sources.is_empty() {
            return Err(GeodesicError::InvalidVertex {
                index: 0,
                vertex_count: n,
            });
        }
        if let Some(&index) = sources.iter().find(|&&s| s >= n) {
            return Err(GeodesicError::InvalidVertex {
                index,
                vertex_count: n,
            });
        }

        // 1. Heat step
        let mut rhs = DVector::<f64>::zeros(n);
        for &s in sources {
            rhs[s] = self.mass[s];
        }
        let (heat, report) = self.heat.solve(&rhs, self.tolerance, self.max_iterations);
        self.log_solve("heat", sources, &report);

        // 2. Normalized field, one vector per face
        let field: Vec<Vector3<f64>> = (0..geometry.face_count())
            .into_par_iter()
            .map(|f| {
                let face = geometry.face(f);
                let basis = geometry.grad_basis(f);
                let grad = basis[0] * heat[face[0] as usize]
                    + basis[1] * heat[face[1] as usize]
                    + basis[2] * heat[face[2] as usize];
                let len = grad.norm();
                if len > f64::MIN_POSITIVE {
                    -grad / len
                } else {
                    Vector3::zeros()
                }
            })
            .collect();

        // 3. Integrated divergence, then Poisson
        let mut divergence = self.integrated_divergence(geometry, &field);
        // Closed surfaces leave the divergence summing to zero; remove drift
        #[allow(clippy::cast_precision_loss)]
        let mean = divergence.sum() / n as f64;
        divergence.add_scalar_mut(-mean);
        divergence.neg_mut();

        let (phi, report) = self.poisson.solve(&divergence, self.tolerance, self.max_iterations);
        self.log_solve("poisson", sources, &report);

        #[allow(clippy::cast_precision_loss)]
        let offset = sources.iter().map(|&s| phi[s]).sum::<f64>() / sources.len() as f64;
        let mut distances: Vec<f64> = phi
            .iter()
            .map(|&d| if (d - offset).is_finite() { (d - offset).max(0.0) } else { 0.0 })
            .collect();
        for &s in sources {
            distances[s] = 0.0;
        }

        Ok(DistanceField::from_distances(distances))
    }

    /// Integrated divergence of a per-face vector field at each vertex.
    fn integrated_divergence(
        &self,
        geometry: &SurfaceGeometry,
        field: &[Vector3<f64>],
    ) -> DVector<f64> {
        let mut divergence = DVector::<f64>::zeros(self.vertex_count());
        for (f, x) in field.iter().enumerate() {
            let face = geometry.face(f);
            let tri = geometry.triangle(f).vertices();
            let cot = &self.cotangents[f];
            for i in 0..3 {
                let j = (i + 1) % 3;
                let k = (i + 2) % 3;
                let e1 = tri[j] - tri[i];
                let e2 = tri[k] - tri[i];
                divergence[face[i] as usize] += 0.5 * (cot[k] * e1.dot(x) + cot[j] * e2.dot(x));
            }
        }
        divergence
    }

    fn log_solve(&self, stage: &str, sources: &[usize], report: &SolveReport) {
        if report.converged {
            debug!(
                stage,
                sources = sources.len(),
                iterations = report.iterations,
                residual = report.relative_residual,
                "Heat method solve converged"
            );
        } else {
            warn!(
                stage,
                sources = sources.len(),
                iterations = report.iterations,
                residual = report.relative_residual,
                tolerance = self.tolerance,
                "Heat method solve hit the iteration cap"
            );
        }
    }
}

/// Cotangent of the interior angle at each corner of `face`.
fn corner_cotangents(geometry: &SurfaceGeometry, face: usize) -> [f64; 3] {
    let v = geometry.triangle(face).vertices();
    std::array::from_fn(|i| {
        let a = v[(i + 1) % 3] - v[i];
        let b = v[(i + 2) % 3] - v[i];
        let cross = a.cross(&b).norm();
        if cross < f64::EPSILON * a.norm() * b.norm() {
            0.0
        } else {
            a.dot(&b) / cross
        }
    })
}
