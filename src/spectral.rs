//! Fourier-domain measurement operator in Hermitian half-spectrum packing
//!
//! The forward model maps a real `NX x NY` image to a masked, scaled 2-D
//! discrete Fourier transform. Because the image is real, the full spectrum
//! is conjugate symmetric and only the first `NY/2 + 1` columns are stored;
//! the packing/unpacking rules live in [`expand_into`] and [`compress_into`]
//! as pure functions so the even/odd edge cases can be tested on their own.
//!
//! Transforms are built from 1-D `rustfft` plans (rows first, then the kept
//! columns), planned once per [`SpectralOperator`] and reused together with
//! their scratch buffers for every evaluation. Both directions are
//! unnormalized, matching the usual r2c/c2r convention.

use ndarray::prelude::*;
use ndarray::Zip;
use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Number of packed spectrum columns for an image with `ny` columns.
#[inline]
pub fn half_cols(ny: usize) -> usize {
    ny / 2 + 1
}

/// Unpack a half spectrum into the full conjugate-symmetric spectrum.
///
/// The first `ny/2 + 1` columns are copied verbatim; every remaining bin
/// `(i, j)` is the conjugate of its mirror `((nx - i) % nx, ny - j)`, which
/// always falls inside the packed half. Row `0` (and row `nx/2` for even
/// `nx`) mirror onto themselves.
pub fn expand_into(half: ArrayView2<Complex64>, mut full: ArrayViewMut2<Complex64>) {
    let (nx, ny_h) = half.dim();
    let ny = full.dim().1;
    debug_assert_eq!(full.dim().0, nx);
    debug_assert_eq!(ny_h, half_cols(ny));

    for i in 0..nx {
        for j in 0..ny_h {
            full[[i, j]] = half[[i, j]];
        }
        let mi = if i == 0 { 0 } else { nx - i };
        for j in ny_h..ny {
            full[[i, j]] = half[[mi, ny - j]].conj();
        }
    }
}

/// Truncate a full spectrum to its packed half: the first `ny/2 + 1`
/// columns of each row.
pub fn compress_into(full: ArrayView2<Complex64>, mut half: ArrayViewMut2<Complex64>) {
    let (nx, ny_h) = half.dim();
    debug_assert_eq!(full.dim().0, nx);
    debug_assert_eq!(ny_h, half_cols(full.dim().1));

    for i in 0..nx {
        for j in 0..ny_h {
            half[[i, j]] = full[[i, j]];
        }
    }
}

/// Plan-bound 2-D real-to-half-spectrum transform pair with the masked
/// residual and gradient evaluations built on top of it.
///
/// Holds forward and inverse plans for both axes plus scratch storage, so
/// repeated evaluations inside an optimization loop allocate nothing.
pub struct SpectralOperator {
    nx: usize,
    ny: usize,
    ny_h: usize,
    fft_row: Arc<dyn Fft<f64>>,
    fft_col: Arc<dyn Fft<f64>>,
    ifft_row: Arc<dyn Fft<f64>>,
    ifft_col: Arc<dyn Fft<f64>>,
    row_buf: Vec<Complex64>,
    col_buf: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl SpectralOperator {
    pub fn new(nx: usize, ny: usize) -> SpectralOperator {
        let mut planner = FftPlanner::new();

        let fft_row = planner.plan_fft(ny, FftDirection::Forward);
        let fft_col = planner.plan_fft(nx, FftDirection::Forward);
        let ifft_row = planner.plan_fft(ny, FftDirection::Inverse);
        let ifft_col = planner.plan_fft(nx, FftDirection::Inverse);

        let scratch_len = fft_row
            .get_inplace_scratch_len()
            .max(fft_col.get_inplace_scratch_len())
            .max(ifft_row.get_inplace_scratch_len())
            .max(ifft_col.get_inplace_scratch_len());

        SpectralOperator {
            nx,
            ny,
            ny_h: half_cols(ny),
            fft_row,
            fft_col,
            ifft_row,
            ifft_col,
            row_buf: vec![Complex64::new(0.0, 0.0); ny],
            col_buf: vec![Complex64::new(0.0, 0.0); nx],
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
        }
    }

    #[inline]
    fn sqrt_n(&self) -> f64 {
        ((self.nx * self.ny) as f64).sqrt()
    }

    /// Unnormalized forward transform of a real image into the packed half
    /// spectrum: a length-`ny` FFT of each row keeping the first `ny/2 + 1`
    /// bins, then a length-`nx` FFT down each kept column.
    pub fn forward_into(&mut self, x: ArrayView1<f64>, out: &mut Array2<Complex64>) {
        debug_assert_eq!(x.len(), self.nx * self.ny);
        debug_assert_eq!(out.dim(), (self.nx, self.ny_h));

        for i in 0..self.nx {
            for j in 0..self.ny {
                self.row_buf[j] = Complex64::new(x[i * self.ny + j], 0.0);
            }
            self.fft_row
                .process_with_scratch(&mut self.row_buf, &mut self.scratch);
            for j in 0..self.ny_h {
                out[[i, j]] = self.row_buf[j];
            }
        }

        for j in 0..self.ny_h {
            for i in 0..self.nx {
                self.col_buf[i] = out[[i, j]];
            }
            self.fft_col
                .process_with_scratch(&mut self.col_buf, &mut self.scratch);
            for i in 0..self.nx {
                out[[i, j]] = self.col_buf[i];
            }
        }
    }

    /// Unnormalized inverse of [`forward_into`]: inverse FFT down each
    /// column, per-row Hermitian completion to the full width, inverse FFT
    /// across each row, real part. The spectral input is consumed as
    /// in-place work space. `inverse_into(forward_into(x))` scales `x` by
    /// `nx * ny`.
    pub fn inverse_into(&mut self, half: &mut Array2<Complex64>, mut out: ArrayViewMut1<f64>) {
        debug_assert_eq!(half.dim(), (self.nx, self.ny_h));
        debug_assert_eq!(out.len(), self.nx * self.ny);

        for j in 0..self.ny_h {
            for i in 0..self.nx {
                self.col_buf[i] = half[[i, j]];
            }
            self.ifft_col
                .process_with_scratch(&mut self.col_buf, &mut self.scratch);
            for i in 0..self.nx {
                half[[i, j]] = self.col_buf[i];
            }
        }

        for i in 0..self.nx {
            for j in 0..self.ny_h {
                self.row_buf[j] = half[[i, j]];
            }
            for j in self.ny_h..self.ny {
                self.row_buf[j] = half[[i, self.ny - j]].conj();
            }
            self.ifft_row
                .process_with_scratch(&mut self.row_buf, &mut self.scratch);
            for j in 0..self.ny {
                out[i * self.ny + j] = self.row_buf[j].re;
            }
        }
    }

    /// Turn a model half spectrum into the masked, weighted residual:
    /// zero where the mask is zero, `observed - mask * model / sqrt(nx*ny)`
    /// elsewhere.
    pub fn residual_into(
        &self,
        observed: ArrayView2<Complex64>,
        mask: ArrayView2<f64>,
        model: &mut Array2<Complex64>,
    ) {
        let s = self.sqrt_n();
        Zip::from(model.view_mut())
            .and(observed)
            .and(mask)
            .apply(|m, &y, &w| {
                *m = if w == 0.0 {
                    Complex64::new(0.0, 0.0)
                } else {
                    y - *m * (w / s)
                };
            });
    }

    /// Evaluate the data term `|expand(residual)|^2 / 4` at `x`.
    ///
    /// The quarter compensates for every conjugate pair being stored once in
    /// the packed half and counted twice after expansion. On return `half`
    /// holds the masked residual, ready for [`gradient_into`]; `full` is
    /// overwritten with its expansion.
    pub fn data_term(
        &mut self,
        x: ArrayView1<f64>,
        observed: ArrayView2<Complex64>,
        mask: ArrayView2<f64>,
        half: &mut Array2<Complex64>,
        full: &mut Array2<Complex64>,
    ) -> f64 {
        self.forward_into(x, half);
        self.residual_into(observed, mask, half);
        expand_into(half.view(), full.view_mut());
        0.25 * full.iter().fold(0.0, |acc, v| acc + v.norm_sqr())
    }

    /// Gradient of the data term with respect to the image, from the
    /// residual left behind by [`data_term`]. Each observed bin is scaled by
    /// `-mask / (2 sqrt(nx*ny))` and the result is inverse transformed; the
    /// half factor pairs with the quarter in the data term. The residual is
    /// consumed.
    pub fn gradient_into(
        &mut self,
        residual: &mut Array2<Complex64>,
        mask: ArrayView2<f64>,
        out: ArrayViewMut1<f64>,
    ) {
        let s = 2.0 * self.sqrt_n();
        Zip::from(residual.view_mut()).and(mask).apply(|r, &w| {
            *r = if w == 0.0 {
                Complex64::new(0.0, 0.0)
            } else {
                *r * (-w / s)
            };
        });
        self.inverse_into(residual, out);
    }
}
