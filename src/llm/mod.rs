//! Model-assisted review planning.
//!
//! The model path is an alternate producer of the same `ReviewPlan` contract
//! as the heuristic engine: it must validate against the same schema or fail
//! loudly. The baseline heuristic plan is prompt context only, never an
//! implicit fallback.

pub mod client;
pub mod grouping;
pub mod models;
pub mod prompts;

pub use client::{is_available, SchemaMismatch};
pub use grouping::build_model_review_plan;
