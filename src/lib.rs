//! A small Lisp runtime built on a fixed-capacity value arena, a
//! generational mark-sweep collector and a substitution-based evaluator.
//!
//! Functions take parameters by rewriting their body rather than through
//! environment frames, so `(.\ (x) (* x x))` applied to `5` evaluates
//! `(* 5 5)`. Macros (`m\`) receive their arguments unevaluated and have
//! their substituted body evaluated twice. Passing `..` for an argument
//! leaves that parameter open and yields a new function.

pub mod config;
pub mod error;
pub mod eval;
pub mod gc;
pub mod heap;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod roots;
pub mod symbol;
pub mod value;

pub use config::Config;
pub use error::{LispError, LispResult};
pub use eval::Machine;
pub use value::{Kind, Value, ValueRef};
