//! Proximal operators for the nonsmooth penalties
//!
//! The L1 prox is a closed-form soft threshold; the TV prox has no closed
//! form and runs a fixed-budget dual solver instead. TSV is smooth, so it
//! contributes a gradient rather than a prox, but it lives here with the
//! penalty it replaces.

mod fgp;
pub use fgp::*;

mod threshold;
pub use threshold::*;
