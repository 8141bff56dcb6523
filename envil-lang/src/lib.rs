//! Interpreter gateway for ENVIL audio live coding.
//!
//! Owns at most one sclang session. Code is evaluated by writing it to the
//! interpreter's stdin; every line the process prints goes to the post window.

pub mod backend;
pub mod gateway;
pub mod sclang;

pub use backend::{EvalError, EvalResult, Interpreter, Launcher};
pub use gateway::{GatewayError, InterpreterGateway, Lifecycle, SessionStatus};
pub use sclang::{SclangLauncher, SclangOptions, SclangProcess};
