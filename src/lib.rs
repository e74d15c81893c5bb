//! cinder: a small imperative language compiled to a linear stack-machine
//! IR and executed on a virtual machine.
//!
//! The pipeline is `frontend` (tokens and syntax tree), `bytecode`
//! (scope-aware analysis, code generation, listings and program images)
//! and `runtime` (the VM).

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod runtime;
