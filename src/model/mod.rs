//! Replacement plan model.
//!
//! A [`ReplacementPlan`] is assembled with a [`PlanBuilder`] (or read from a
//! JSON plan file) and then applied to a template in one generation pass.

mod dimension;
mod options;
mod plan;
mod plan_file;

pub use dimension::{Dimension, Unit};
pub use options::{ImageOptions, ImageSize, TextOptions};
pub use plan::{CloneGroup, CloneRow, PlanBuilder, Replacement, ReplacementPlan};
pub(crate) use plan::normalize_token;
