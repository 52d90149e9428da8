//! Errors raised while building model values.

/// Errors that can occur when constructing or editing model values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid trim range [{start}, {end}) for source of {duration}s")]
    InvalidTrimRange { start: f64, end: f64, duration: f64 },

    #[error("Invalid filter expression '{input}': {message}")]
    InvalidFilterExpression { input: String, message: String },

    #[error("Filter not found: {name}")]
    FilterNotFound { name: String },
}
