use thiserror::Error;

/// A fatal runtime condition. Every variant that can be traced to a single
/// instruction carries the index of the instruction that was executing.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("instruction {ip}: operand stack underflow")]
    StackUnderflow { ip: usize },

    #[error("instruction {ip}: operand stack exceeds {limit} values")]
    StackOverflow { ip: usize, limit: usize },

    #[error("instruction {ip}: name '{name}' is not defined")]
    Unresolved { name: String, ip: usize },

    #[error("instruction {ip}: '{name}' has no value yet")]
    Unassigned { name: String, ip: usize },

    #[error("instruction {ip}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        ip: usize,
    },

    #[error("instruction {ip}: divide by zero")]
    DivideByZero { ip: usize },

    #[error("instruction {ip}: modulo by zero")]
    ModuloByZero { ip: usize },

    #[error("instruction {ip}: index {index} out of bounds for '{name}' (length {len})")]
    IndexOutOfBounds {
        name: String,
        index: i64,
        len: usize,
        ip: usize,
    },

    #[error("instruction {ip}: invalid array length {len} for '{name}'")]
    InvalidArrayLength { name: String, len: i64, ip: usize },

    #[error("instruction {ip}: unknown label '{name}'")]
    UnknownLabel { name: String, ip: usize },

    #[error("instruction {ip}: unknown function '{name}'")]
    UnknownFunction { name: String, ip: usize },

    #[error("instruction {ip}: duplicate label '{name}'")]
    DuplicateLabel { name: String, ip: usize },

    #[error("instruction {ip}: duplicate function '{name}'")]
    DuplicateFunction { name: String, ip: usize },

    #[error("function body starting at instruction {ip} is never closed")]
    UnterminatedFunction { ip: usize },

    #[error("instruction {ip}: return outside of a function call")]
    ReturnOutsideCall { ip: usize },

    #[error("instruction {ip}: scope underflow")]
    ScopeUnderflow { ip: usize },

    #[error("instruction {ip}: '{name}' is already defined in this scope")]
    Redefined { name: String, ip: usize },

    #[error("instruction {ip}: cannot read input: {message}")]
    ReadFailed { message: String, ip: usize },

    #[error("instruction {ip}: cannot write output: {message}")]
    WriteFailed { message: String, ip: usize },

    /// The execution safety bound tripped. This is a recoverable report of a
    /// runaway program, not a crash.
    #[error("step limit exceeded ({limit} instructions)")]
    StepLimitExceeded { limit: usize },

    #[error("call depth limit exceeded ({limit})")]
    CallDepthExceeded { limit: usize },
}
