use thiserror::Error;

#[derive(Error, Debug)]
pub enum JigsawError {
    #[error("Invalid bundle setting: {0}")]
    InvalidSetting(String),

    #[error("Invalid control network: {0}")]
    InvalidNetwork(String),

    #[error("Image not found in the image list: {0}")]
    MissingImage(String),

    #[error("No observation solve settings match: {0}")]
    MissingSolveSettings(String),

    #[error("Ill-conditioned point block: {0}")]
    IllConditionedPoint(String),

    #[error("Reduced normal matrix is not positive definite (block {block}, pivot {pivot:e})")]
    NotPositiveDefinite { block: usize, pivot: f64 },

    #[error("Bundle did not converge after {iterations} iterations (sigma0 = {sigma0})")]
    Diverged { iterations: usize, sigma0: f64 },

    #[error("Bundle adjustment cancelled after {0} iterations")]
    Cancelled(usize),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Error during the nom parsing: {0}")]
    NomParsingError(String),

    #[error("Unsupported control network version: {0}")]
    UnsupportedVersion(u32),

    #[error("Time conversion error: {0}")]
    Time(String),
}

impl From<hifitime::HifitimeError> for JigsawError {
    fn from(err: hifitime::HifitimeError) -> Self {
        JigsawError::Time(err.to_string())
    }
}

impl PartialEq for JigsawError {
    fn eq(&self, other: &Self) -> bool {
        use JigsawError::*;
        match (self, other) {
            (InvalidSetting(a), InvalidSetting(b)) => a == b,
            (InvalidNetwork(a), InvalidNetwork(b)) => a == b,
            (MissingImage(a), MissingImage(b)) => a == b,
            (MissingSolveSettings(a), MissingSolveSettings(b)) => a == b,
            (IllConditionedPoint(a), IllConditionedPoint(b)) => a == b,
            (
                NotPositiveDefinite { block: a, pivot: pa },
                NotPositiveDefinite { block: b, pivot: pb },
            ) => a == b && pa.to_bits() == pb.to_bits(),
            (
                Diverged {
                    iterations: a,
                    sigma0: sa,
                },
                Diverged {
                    iterations: b,
                    sigma0: sb,
                },
            ) => a == b && sa.to_bits() == sb.to_bits(),
            (Cancelled(a), Cancelled(b)) => a == b,
            (NomParsingError(a), NomParsingError(b)) => a == b,
            (UnsupportedVersion(a), UnsupportedVersion(b)) => a == b,
            (Time(a), Time(b)) => a == b,

            // Wrapped transport errors compare by variant only
            (IoError(_), IoError(_)) => true,
            (Json(_), Json(_)) => true,
            (Csv(_), Csv(_)) => true,

            _ => false,
        }
    }
}

impl JigsawError {
    /// Short machine-readable kind, used by the command line for its structured error line.
    pub fn kind(&self) -> &'static str {
        use JigsawError::*;
        match self {
            InvalidSetting(_) => "InvalidSetting",
            InvalidNetwork(_) => "InvalidNetwork",
            MissingImage(_) => "MissingImage",
            MissingSolveSettings(_) => "MissingSolveSettings",
            IllConditionedPoint(_) => "IllConditionedPoint",
            NotPositiveDefinite { .. } => "NotPositiveDefinite",
            Diverged { .. } => "Diverged",
            Cancelled(_) => "Cancelled",
            IoError(_) | Json(_) | Csv(_) | NomParsingError(_) | UnsupportedVersion(_) => {
                "IOError"
            }
            Time(_) => "IOError",
        }
    }
}
