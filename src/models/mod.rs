//! Decay models.
//!
//! Models are small, pure evaluators so that fitting and reconstruction code
//! can stay generic:
//!
//! - `model`: the standard sum-of-exponentials model and the user-defined
//!   target model behind one `DecayModel` type
//! - `expr`: tokenizer, parser and evaluator of the target-model language

pub mod expr;
pub mod model;

pub use expr::{CompiledSummand, Expr, compile_summand};
pub use model::*;
