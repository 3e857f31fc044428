//! Exit codes for the CLI tool.

use backpipe::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Operation completed with warnings
pub const WARNING: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Artifact is damaged or not what it claims to be
pub const BAD_ARTIFACT: i32 = 3;
/// Decryption produced a checksum mismatch
pub const WRONG_KEY: i32 = 4;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Warning,
    FatalError,
    BadArtifact,
    WrongKey,
    IoError,
    UserInterrupt,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Warning => WARNING,
            Self::FatalError => FATAL_ERROR,
            Self::BadArtifact => BAD_ARTIFACT,
            Self::WrongKey => WRONG_KEY,
            Self::IoError => IO_ERROR,
            Self::UserInterrupt => USER_INTERRUPT,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts a backpipe error to an exit code.
///
/// A checksum mismatch in the decrypt stage is reported as a wrong key;
/// anywhere else it means a damaged artifact.
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    let decrypting = error.stage() == Some(backpipe::Stage::Decrypt);
    match error.root_cause() {
        Error::ChecksumMismatch { .. } if decrypting => ExitCode::WrongKey,
        Error::Io(_) | Error::DirCreateFailed { .. } => ExitCode::IoError,
        Error::NotFound { .. } | Error::DestinationNotWritable { .. } => ExitCode::IoError,
        Error::FormatMismatch { .. }
        | Error::CorruptHeader { .. }
        | Error::TruncatedData { .. }
        | Error::ChecksumMismatch { .. } => ExitCode::BadArtifact,
        Error::PathTraversal { .. } => ExitCode::FatalError,
        Error::InvalidConfig(_)
        | Error::InvalidRegex { .. }
        | Error::InvalidCompressionLevel { .. }
        | Error::UnsupportedAlgorithm { .. }
        | Error::EmptyInput => ExitCode::BadArgs,
        Error::RecordNotFound(_) => ExitCode::BadArgs,
        Error::Json(_) => ExitCode::FatalError,
        Error::Cancelled => ExitCode::UserInterrupt,
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backpipe::Stage;

    fn mismatch() -> Error {
        Error::ChecksumMismatch {
            path: None,
            expected: 1,
            actual: 2,
        }
    }

    #[test]
    fn test_checksum_mismatch_depends_on_stage() {
        let err = mismatch().in_stage(Stage::Decrypt, "a.enc");
        assert_eq!(error_to_exit_code(&err), ExitCode::WrongKey);
        let err = mismatch().in_stage(Stage::Decompress, "a.huff");
        assert_eq!(error_to_exit_code(&err), ExitCode::BadArtifact);
    }

    #[test]
    fn test_config_errors_are_bad_args() {
        let err = Error::InvalidCompressionLevel { level: 12 };
        assert_eq!(error_to_exit_code(&err).code(), BAD_ARGS);
    }
}
