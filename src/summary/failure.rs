//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Plan/run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Plan completed successfully
    Success,
    /// Plan failed during execution
    Failed,
    /// Plan never ran: a dependency failed, its platform aborted, or
    /// the run was interrupted
    Skipped,
}

impl Status {
    /// Check if this is a terminal failure state
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed)
    }
}

/// Failure kind - categorizes the cause of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Build description failed structural validation
    MalformedSpec,
    /// Duplicate define across merge levels
    ConflictingOption,
    /// An OS target resolved to an empty architecture list
    EmptyArchitectureList,
    /// Subdirectory references form a cycle
    CyclicDependency,
    /// A library reference matched no artifact and carries no path
    UnresolvedLibrary,
    /// The external generator exited non-zero
    GeneratorFailed,
    /// A copy rule matched nothing or a copy could not be performed
    CopyFailed,
    /// Two plans claimed the same destination path
    DestinationCollision,
    /// The run was interrupted
    Interrupted,
    /// Uncategorized I/O failure
    Io,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::MalformedSpec => ExitCode::MalformedSpec,
            FailureKind::ConflictingOption => ExitCode::ConflictingOption,
            FailureKind::EmptyArchitectureList => ExitCode::EmptyArchitectureList,
            FailureKind::CyclicDependency => ExitCode::CyclicDependency,
            FailureKind::UnresolvedLibrary => ExitCode::UnresolvedLibrary,
            FailureKind::GeneratorFailed => ExitCode::GeneratorFailed,
            FailureKind::CopyFailed => ExitCode::CopyFailed,
            FailureKind::DestinationCollision => ExitCode::DestinationCollision,
            FailureKind::Interrupted => ExitCode::Interrupted,
            FailureKind::Io => ExitCode::Io,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::MalformedSpec => "Build description is malformed",
            FailureKind::ConflictingOption => "Conflicting define across merge levels",
            FailureKind::EmptyArchitectureList => "Architecture list resolved empty",
            FailureKind::CyclicDependency => "Cyclic subdirectory dependency",
            FailureKind::UnresolvedLibrary => "Unresolved library reference",
            FailureKind::GeneratorFailed => "Generator invocation failed",
            FailureKind::CopyFailed => "Artifact copy failed",
            FailureKind::DestinationCollision => "Artifact destination collision",
            FailureKind::Interrupted => "Run interrupted",
            FailureKind::Io => "I/O error",
        }
    }
}

/// Stable exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful run
    Success = 0,
    /// Uncategorized I/O failure
    Io = 1,
    /// Build description failed validation
    MalformedSpec = 10,
    /// Duplicate define across merge levels
    ConflictingOption = 11,
    /// Empty architecture list
    EmptyArchitectureList = 12,
    /// Cyclic subdirectory dependency
    CyclicDependency = 13,
    /// Unresolved library reference
    UnresolvedLibrary = 20,
    /// Generator failed
    GeneratorFailed = 30,
    /// Artifact copy failed
    CopyFailed = 40,
    /// Destination collision
    DestinationCollision = 41,
    /// Run interrupted
    Interrupted = 80,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Create from integer value
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::Io),
            10 => Some(ExitCode::MalformedSpec),
            11 => Some(ExitCode::ConflictingOption),
            12 => Some(ExitCode::EmptyArchitectureList),
            13 => Some(ExitCode::CyclicDependency),
            20 => Some(ExitCode::UnresolvedLibrary),
            30 => Some(ExitCode::GeneratorFailed),
            40 => Some(ExitCode::CopyFailed),
            41 => Some(ExitCode::DestinationCollision),
            80 => Some(ExitCode::Interrupted),
            _ => None,
        }
    }

    /// Check if this exit code indicates success
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Success
    }
}

/// Helper for aggregating exit codes across the plans of one run
pub struct ExitCodeAggregator {
    has_interrupted: bool,
    first_failure_code: Option<ExitCode>,
}

impl ExitCodeAggregator {
    /// Create a new aggregator
    pub fn new() -> Self {
        Self {
            has_interrupted: false,
            first_failure_code: None,
        }
    }

    /// Add a plan's status and exit code to the aggregation
    pub fn add(&mut self, status: Status, exit_code: ExitCode) {
        match status {
            Status::Failed => {
                if exit_code == ExitCode::Interrupted {
                    self.has_interrupted = true;
                } else if self.first_failure_code.is_none() {
                    self.first_failure_code = Some(exit_code);
                }
            }
            Status::Success | Status::Skipped => {}
        }
    }

    /// Get the aggregated status
    pub fn status(&self) -> Status {
        if self.has_interrupted || self.first_failure_code.is_some() {
            Status::Failed
        } else {
            Status::Success
        }
    }

    /// Get the aggregated exit code: interruption dominates, then the
    /// first failure in completion order.
    pub fn exit_code(&self) -> ExitCode {
        if self.has_interrupted {
            ExitCode::Interrupted
        } else if let Some(code) = self.first_failure_code {
            code
        } else {
            ExitCode::Success
        }
    }
}

impl Default for ExitCodeAggregator {
    fn default() -> Self {
        Self::new()
    }
}
