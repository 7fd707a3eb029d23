use crate::ast::Value;
use thiserror::Error;

/// Errors raised while compiling or evaluating script text (conditions, function bodies).
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Script does not define a `main` function")]
    MissingMain,

    #[error("Name '{0}' is not defined")]
    UnknownName(String),

    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: Value,
    },

    #[error("'{type_name}' has no attribute '{attribute}'")]
    UnknownAttribute {
        type_name: &'static str,
        attribute: String,
    },

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Index {index} is out of range for a sequence of length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Function '{function}' expects {expected} argument(s), got {found}")]
    ArgumentCount {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Cannot convert '{0}' to a number")]
    InvalidNumber(String),

    #[error("Result of '{operation}' exceeds the {limit} byte limit")]
    ValueTooLarge { operation: String, limit: usize },
}

/// Errors raised from inside a node's `run`. The traversal converts them into a failed pass.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("No match found for pattern '{pattern}'")]
    NoMatch { pattern: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Input error: {0}")]
    Input(String),

    #[error("Node worker panicked: {0}")]
    Panicked(String),
}

/// Structural and configuration errors. These are returned to the caller, never swallowed by the
/// traversal loop.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("The flowchart has no Start node")]
    MissingStart,

    #[error("The flowchart already has a Start node ('{0}')")]
    DuplicateStart(String),

    #[error("The flowchart already has an Init node ('{0}')")]
    DuplicateInit(String),

    #[error("A node with id '{0}' already exists")]
    DuplicateNodeId(String),

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Edge '{0}' not found")]
    EdgeNotFound(String),

    #[error("Node '{id}' has an unregistered classname: '{classname}'")]
    UnknownNodeClass { id: String, classname: String },

    #[error("Node '{id}' has an invalid field '{field}': {message}")]
    InvalidField {
        id: String,
        field: String,
        message: String,
    },

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid engine configuration: {0}")]
    Config(String),
}
