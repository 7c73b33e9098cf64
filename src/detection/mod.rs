//! Detection Module
//!
//! The two independent leak detectors and the policy that reconciles them:
//! - `residual`: flow-residual classifier with a per-segment rolling pressure
//!   baseline (the "ML side" second opinion)
//! - `fusion`: combines the residual and physics sub-verdicts into one final
//!   status and confidence
//!
//! The residual classifier and the physics engine deliberately share no
//! state — fusion leans on their independence.

pub mod fusion;
pub mod residual;

pub use fusion::{fuse, is_correct, FusedDecision};
pub use residual::ResidualClassifier;
