//! Exit codes for the opsctl CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing:
//! - 0: operation succeeded (for doctor: overall summary ok)
//! - 1: operation ran but the outcome is a failure (unhealthy, blocked, diagnosed)
//! - 2: usage or environment error (bad arguments, missing interpreter)

/// Exit codes for opsctl operations.
///
/// These codes are a stable contract for automation. Changes require
/// a major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: the command achieved its goal.
    Clean = 0,

    /// Handled failure: the command ran and the outcome is negative
    /// (backend unhealthy, ownership blocked, doctor found problems).
    CheckFailed = 1,

    /// Usage or environment error (invalid arguments, missing interpreter).
    UsageError = 2,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Get the exit code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::CheckFailed => "ERR_CHECK_FAILED",
            ExitCode::UsageError => "ERR_USAGE",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::CheckFailed.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
    }

    #[test]
    fn test_is_success() {
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::CheckFailed.is_success());
        assert!(!ExitCode::UsageError.is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::Clean.to_string(), "OK (0)");
        assert_eq!(ExitCode::UsageError.to_string(), "ERR_USAGE (2)");
    }
}
