use thiserror::Error;

/// Analysis-fatal error kinds.
///
/// Warnings are deliberately not here: they accumulate on the outcome and
/// never abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Violated internal invariant. Never a user error.
    #[error("internal invariant violated: {0}")]
    Logic(String),

    /// The model fails syntactic or semantic validation.
    #[error("invalid model: {message}{}", location.as_deref().map(|l| format!(" ({l})")).unwrap_or_default())]
    Validity {
        message: String,
        /// Source location of the offending construct, when known.
        location: Option<String>,
    },

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("xml error")]
    Xml(#[from] quick_xml::Error),

    /// Unsound result would follow: cutoff exhaustion, bad sampling, etc.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Cooperative cancellation or deadline observed.
    #[error("analysis cancelled")]
    Cancelled,
}

impl Error {
    pub fn validity(message: impl Into<String>) -> Self {
        Error::Validity { message: message.into(), location: None }
    }

    pub fn validity_at(message: impl Into<String>, location: impl Into<String>) -> Self {
        Error::Validity { message: message.into(), location: Some(location.into()) }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal findings attached to the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The rare-event sum exceeded 1 and was clamped.
    ProbabilityClamped,
    /// The product-size or probability cutoff truncated the result family.
    ProductsTruncated,
    /// MCUB applied to a non-coherent tree; the bound is not conservative.
    NonCoherentMcub,
    /// PFH is a simplified average failure frequency, magnitude-accurate only.
    SimplifiedPfh,
    /// The top event reduced to a constant during preprocessing.
    TopConstant(bool),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ProbabilityClamped => write!(f, "probability sum clamped to 1"),
            Warning::ProductsTruncated => write!(f, "cutoffs truncated the product family"),
            Warning::NonCoherentMcub => {
                write!(f, "MCUB on a non-coherent tree is not conservative")
            }
            Warning::SimplifiedPfh => {
                write!(f, "PFH is a simplified average failure frequency")
            }
            Warning::TopConstant(value) => {
                write!(f, "top event is constant {value}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_display() {
        let err = Error::validity_at("probability out of [0, 1]", "basic-event pump");
        let text = err.to_string();
        assert!(text.contains("probability out of [0, 1]"));
        assert!(text.contains("basic-event pump"));
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(Warning::ProbabilityClamped.to_string(), "probability sum clamped to 1");
    }
}
