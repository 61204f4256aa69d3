use faer::{
    Mat,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Qr, SymbolicQr},
};

use crate::linalg::{
    LinAlgError, LinAlgResult, SparseLinearSolver, ensure_finite, normal_equations,
};

/// Sparse QR solver for the normal equations of a linear graph.
///
/// Slower than [`SparseCholeskySolver`](crate::linalg::SparseCholeskySolver) but does not
/// need `AᵀA` to be numerically positive definite to factorize. A rank-deficient system
/// still factorizes; the non-finite solution it produces is reported as
/// [`LinAlgError::SingularMatrix`].
#[derive(Debug, Clone, Default)]
pub struct SparseQRSolver {
    symbolic_factorization: Option<SymbolicQr<usize>>,
    hessian: Option<SparseColMat<usize, f64>>,
    gradient: Option<Mat<f64>>,
}

impl SparseQRSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached symbolic analysis.
    pub fn reset(&mut self) {
        self.symbolic_factorization = None;
    }
}

impl SparseLinearSolver for SparseQRSolver {
    fn solve_normal_equation(
        &mut self,
        jacobian: &SparseColMat<usize, f64>,
        rhs: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let (hessian, gradient) = normal_equations(jacobian, rhs)?;

        let symbolic = match &self.symbolic_factorization {
            Some(symbolic) => symbolic.clone(),
            None => {
                let symbolic = SymbolicQr::try_new(hessian.symbolic()).map_err(|e| {
                    LinAlgError::FactorizationFailed("symbolic QR analysis failed".to_string())
                        .log_with_source(e)
                })?;
                self.symbolic_factorization = Some(symbolic.clone());
                symbolic
            }
        };

        let qr = Qr::try_new_with_symbolic(symbolic, hessian.as_ref())
            .map_err(|e| LinAlgError::SingularMatrix.log_with_source(e))?;
        let x = ensure_finite(qr.solve(-&gradient))?;

        self.hessian = Some(hessian);
        self.gradient = Some(gradient);
        Ok(x)
    }

    fn get_hessian(&self) -> Option<&SparseColMat<usize, f64>> {
        self.hessian.as_ref()
    }

    fn get_gradient(&self) -> Option<&Mat<f64>> {
        self.gradient.as_ref()
    }
}
