//! The `ndarray-mfista` crate reconstructs a real 2-D image from incomplete,
//! noisy Fourier-domain measurements, as they arise in radio
//! interferometry, by solving a sparsity- and smoothness-regularized
//! least-squares problem with the monotone FISTA algorithm of
//! Beck and Teboulle.
//!
//! It provides:
//! - the monotone accelerated proximal-gradient driver with backtracking
//!   and a non-increasing cost guarantee ([`mfista`])
//! - L1, total variation (TV) and total squared variation (TSV) penalties,
//!   each with a nonnegative variant ([`prox`])
//! - the half-spectrum Fourier measurement operator, which exploits the
//!   conjugate symmetry of a real image's transform to halve storage and
//!   compute ([`spectral`])
//! - diagnostics for a finished reconstruction ([`summary`])
//!
//! Transforms run on `rustfft` plans built once per solver call; images are
//! flat `ndarray` vectors in row-major `NX x NY` layout.

pub mod mfista;
pub mod prox;
pub mod spectral;
pub mod summary;
