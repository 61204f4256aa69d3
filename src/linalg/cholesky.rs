use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
};

use crate::linalg::{
    LinAlgError, LinAlgResult, SparseLinearSolver, ensure_finite, normal_equations,
};

/// Sparse Cholesky (`LLᵀ`) solver for the normal equations of a linear graph.
///
/// The symbolic analysis is cached and reused while the sparsity pattern of `AᵀA` stays the
/// same; call [`SparseCholeskySolver::reset`] before solving a structurally different graph.
#[derive(Debug, Clone, Default)]
pub struct SparseCholeskySolver {
    symbolic_factorization: Option<SymbolicLlt<usize>>,
    hessian: Option<SparseColMat<usize, f64>>,
    gradient: Option<Mat<f64>>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached symbolic analysis.
    pub fn reset(&mut self) {
        self.symbolic_factorization = None;
    }

    fn symbolic(&mut self, hessian: &SparseColMat<usize, f64>) -> LinAlgResult<SymbolicLlt<usize>> {
        if let Some(symbolic) = &self.symbolic_factorization {
            return Ok(symbolic.clone());
        }
        let symbolic = SymbolicLlt::try_new(hessian.symbolic(), Side::Lower).map_err(|e| {
            LinAlgError::FactorizationFailed("symbolic Cholesky analysis failed".to_string())
                .log_with_source(e)
        })?;
        self.symbolic_factorization = Some(symbolic.clone());
        Ok(symbolic)
    }
}

impl SparseLinearSolver for SparseCholeskySolver {
    fn solve_normal_equation(
        &mut self,
        jacobian: &SparseColMat<usize, f64>,
        rhs: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let (hessian, gradient) = normal_equations(jacobian, rhs)?;
        let symbolic = self.symbolic(&hessian)?;

        // a rank-deficient AᵀA is not positive definite and fails here
        let llt = Llt::try_new_with_symbolic(symbolic, hessian.as_ref(), Side::Lower)
            .map_err(|e| LinAlgError::SingularMatrix.log_with_source(e))?;

        let x = ensure_finite(llt.solve(-&gradient))?;
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
