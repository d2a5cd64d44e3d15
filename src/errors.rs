use thiserror::Error;

/// Failure raised by a macro handler.
///
/// The engine never propagates these to the caller: a failing handler is
/// logged and its invocation is left in the output as written.
#[derive(Debug, Error)]
pub enum MacroError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Evaluation error: {0}")]
    Evaluation(String),
    #[error("Bridge error: {0}")]
    Bridge(String),
    #[error("Calculation error: {0}")]
    Calc(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid engine config: {0}")]
    Config(#[from] serde_json::Error),
}
