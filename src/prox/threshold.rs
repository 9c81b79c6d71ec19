//! Soft-thresholding operators and the total squared variation penalty

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray::Zip;

/// Elementwise soft threshold, `sign(v) * max(|v| - eta, 0)`.
///
/// This is the proximal operator of `eta * |x|_1`.
pub fn soft_threshold<S: NdFloat>(v: ArrayView1<S>, eta: S, mut out: ArrayViewMut1<S>) {
    Zip::from(&mut out).and(&v).apply(|o, &u| {
        *o = if u >= eta {
            u - eta
        } else if u <= -eta {
            u + eta
        } else {
            S::zero()
        };
    });
}

/// Soft threshold restricted to the nonnegative orthant, `max(v - eta, 0)`.
pub fn soft_threshold_nonneg<S: NdFloat>(v: ArrayView1<S>, eta: S, mut out: ArrayViewMut1<S>) {
    Zip::from(&mut out).and(&v).apply(|o, &u| {
        *o = if u > eta { u - eta } else { S::zero() };
    });
}

/// The two L1 proximal variants, fixed once per solver call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Thresholder {
    Plain,
    Nonneg,
}

impl Thresholder {
    pub fn apply<S: NdFloat>(self, v: ArrayView1<S>, eta: S, out: ArrayViewMut1<S>) {
        match self {
            Thresholder::Plain => soft_threshold(v, eta, out),
            Thresholder::Nonneg => soft_threshold_nonneg(v, eta, out),
        }
    }
}

/// Total squared variation of an `nx x ny` image stored row major: the sum
/// of squared differences between each pixel and its right and lower
/// neighbors, without wrap-around.
pub fn tsv<S: NdFloat>(x: ArrayView1<S>, nx: usize, ny: usize) -> S {
    let mut total = S::zero();
    for i in 0..nx {
        for j in 0..ny {
            let v = x[i * ny + j];
            if j + 1 < ny {
                let d = v - x[i * ny + j + 1];
                total = total + d * d;
            }
            if i + 1 < nx {
                let d = v - x[(i + 1) * ny + j];
                total = total + d * d;
            }
        }
    }
    total
}

/// Gradient of [`tsv`]. Every pixel collects `2 * (x - neighbor)` from each
/// of its up to four neighbors; edge pixels only see the neighbors that
/// exist.
pub fn d_tsv<S: NdFloat>(x: ArrayView1<S>, nx: usize, ny: usize, mut out: ArrayViewMut1<S>) {
    let two = S::from(2.0).unwrap();
    for i in 0..nx {
        for j in 0..ny {
            let v = x[i * ny + j];
            let mut g = S::zero();
            if j + 1 < ny {
                g = g + v - x[i * ny + j + 1];
            }
            if j > 0 {
                g = g + v - x[i * ny + j - 1];
            }
            if i + 1 < nx {
                g = g + v - x[(i + 1) * ny + j];
            }
            if i > 0 {
                g = g + v - x[(i - 1) * ny + j];
            }
            out[i * ny + j] = two * g;
        }
    }
}
