//! Diagnostics recomputed from a finished reconstruction

use crate::prox::{tsv, tv};
use crate::spectral::{half_cols, SpectralOperator};
use ndarray::prelude::*;
use num_complex::Complex64;

/// Figures of merit for a reconstructed image against its data.
#[derive(Clone, Debug)]
pub struct Summary {
    /// Squared residual of the full (expanded) spectrum.
    pub sq_error: f64,
    /// `sq_error` normalized by the number of observed spectral bins,
    /// conjugate pairs counted twice.
    pub mean_sq_error: f64,
    /// Sum of absolute values over the nonzero pixels.
    pub l1_cost: f64,
    /// Number of nonzero pixels.
    pub n_active: usize,
    /// Isotropic TV of the image, present when TV was the active penalty.
    pub tv_cost: Option<f64>,
    /// TSV of the image, present when TSV was the active penalty.
    pub tsv_cost: Option<f64>,
    /// `sq_error / 2` plus every weighted penalty.
    pub final_cost: f64,
}

/// Evaluate a reconstruction. Pure: recomputes the residual from scratch
/// and never touches solver state.
#[allow(clippy::too_many_arguments)]
pub fn summarize(
    x: ArrayView1<f64>,
    y: ArrayView2<Complex64>,
    mask: ArrayView2<f64>,
    nx: usize,
    ny: usize,
    lambda_l1: f64,
    lambda_tv: f64,
    lambda_tsv: f64,
) -> Summary {
    let ny_h = half_cols(ny);
    let mut op = SpectralOperator::new(nx, ny);
    let mut half = Array2::zeros((nx, ny_h));
    let mut full = Array2::zeros((nx, ny));
    let sq_error = 2.0 * op.data_term(x, y, mask, &mut half, &mut full);

    // observed bins of the expanded spectrum: columns 1..=ny-ny_h mirror
    // outside the packed half, so those count double
    let mirrored_cols = ny - ny_h;
    let mut m = 0usize;
    for i in 0..nx {
        for j in 0..ny_h {
            if mask[[i, j]] != 0.0 {
                m += 1;
                if j >= 1 && j <= mirrored_cols {
                    m += 1;
                }
            }
        }
    }

    let mut l1_cost = 0.0;
    let mut n_active = 0usize;
    for &v in x.iter() {
        if v != 0.0 {
            l1_cost += v.abs();
            n_active += 1;
        }
    }

    let mut final_cost = 0.5 * sq_error;
    if lambda_l1 > 0.0 {
        final_cost += lambda_l1 * l1_cost;
    }
    let tsv_cost = if lambda_tsv > 0.0 {
        let t = tsv(x, nx, ny);
        final_cost += lambda_tsv * t;
        Some(t)
    } else {
        None
    };
    let tv_cost = if lambda_tsv <= 0.0 && lambda_tv > 0.0 {
        let t = tv(x, nx, ny);
        final_cost += lambda_tv * t;
        Some(t)
    } else {
        None
    };

    Summary {
        sq_error,
        mean_sq_error: if m > 0 { sq_error / m as f64 } else { 0.0 },
        l1_cost,
        n_active,
        tv_cost,
        tsv_cost,
        final_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn residual_free_fit_reports_only_penalties() {
        let (nx, ny) = (3, 3);
        let x = array![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0];
        let mut op = SpectralOperator::new(nx, ny);
        let mut y = Array2::zeros((nx, half_cols(ny)));
        op.forward_into(x.view(), &mut y);
        y.mapv_inplace(|v| v / 3.0);
        let mask = Array2::from_elem((nx, half_cols(ny)), 1.0);

        let s = summarize(x.view(), y.view(), mask.view(), nx, ny, 0.1, 0.5, 0.0);
        assert!(s.sq_error < 1e-12);
        assert!(s.mean_sq_error < 1e-12);
        assert_abs_diff_eq!(s.l1_cost, 1.5);
        assert_eq!(s.n_active, 2);
        let tv_cost = s.tv_cost.unwrap();
        assert!(s.tsv_cost.is_none());
        assert_abs_diff_eq!(s.final_cost, 0.1 * 1.5 + 0.5 * tv_cost, epsilon = 1e-12);
    }

    #[test]
    fn mean_error_counts_conjugate_pairs_twice() {
        let (nx, ny) = (3, 3);
        // zero image against unit data: every expanded bin contributes one
        let y = Array2::from_elem((nx, half_cols(ny)), Complex64::new(1.0, 0.0));
        let mask = Array2::from_elem((nx, half_cols(ny)), 1.0);
        let x = Array1::zeros(nx * ny);

        let s = summarize(x.view(), y.view(), mask.view(), nx, ny, 0.0, 0.0, 0.0);
        // 9 expanded bins of unit magnitude: sq_error = 2 * 9/4
        assert_abs_diff_eq!(s.sq_error, 4.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.mean_sq_error, 0.5, epsilon = 1e-12);
        assert_eq!(s.n_active, 0);
        assert_abs_diff_eq!(s.final_cost, 2.25, epsilon = 1e-12);
    }
}
