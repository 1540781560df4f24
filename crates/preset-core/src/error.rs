//! Error types for preset-core

/// Result type for preset-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, resolving, or querying presets
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration key, block, or preset does not exist
    #[error("No such configuration '{name}'")]
    NotFound { name: String },

    /// A resolved leaf value cannot be coerced to the requested type
    #[error("Cannot convert '{value}' to {target}")]
    TypeConversion { value: String, target: &'static str },

    /// Two loaded documents share a uuid
    #[error("A preset with uuid '{uuid}' is already defined")]
    DuplicateIdentifier { uuid: String },

    /// A preset's base chain references itself
    #[error("There is a cycle in the preset inheritance involving '{uuid}'")]
    CyclicInheritance { uuid: String },

    /// No loaded preset matches the configured default preset name
    #[error("There is no preset with the default name '{name}'")]
    MissingDefault { name: String },

    /// A raw document does not have the expected shape
    #[error("Invalid preset document: {message}")]
    InvalidDocument { message: String },

    /// I/O failure in a persistence sink
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
