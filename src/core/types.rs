use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ValidationError,
    /// Outbound call with no stub entry and no synthesized payload.
    UnresolvableCall,
    /// Outbound call that does not match the declared output points.
    UnresolvablePoint,
    /// Declared output points the code under test never called.
    UncalledPoints,
    AssertionError,
    /// Call to a host outside of the configured external services.
    UnknownService,
    SerializationError,
    IoError,
    InternalError,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

/// Which pass of a generation session produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPass {
    /// Fresh combinations.
    #[default]
    Explore,
    /// Verbatim replay of combinations passed during exploration.
    Repeat,
}

impl GenerationPass {
    pub fn index(self) -> usize {
        match self {
            GenerationPass::Explore => 0,
            GenerationPass::Repeat => 1,
        }
    }
}
