//! Relative reference resolution against a per-request base URL.

use thiserror::Error;
use url::{ParseError, Url};

/// Why a reference could not be turned into an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("invalid reference `{reference}`: {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid base URL `{base}`: {source}")]
    InvalidBase {
        base: String,
        #[source]
        source: ParseError,
    },

    /// Relative references cannot be resolved against opaque bases such as `mailto:` or `data:`.
    #[error("relative reference `{reference}` against opaque base `{base}`")]
    CannotBeABase { reference: String, base: String },
}

/// Resolves `reference` against `base` following the WHATWG URL algorithm.
///
/// Absolute references come back normalized and otherwise untouched, so
/// resolving an already-resolved URL again is a no-op.
pub fn resolve(reference: &str, base: &Url) -> Result<Url, ResolutionError> {
    base.join(reference).map_err(|source| match source {
        ParseError::RelativeUrlWithCannotBeABaseBase => ResolutionError::CannotBeABase {
            reference: reference.to_string(),
            base: base.to_string(),
        },
        source => ResolutionError::InvalidReference {
            reference: reference.to_string(),
            source,
        },
    })
}

/// Like [`resolve`], for callers that only hold the base as a string.
pub fn resolve_against(reference: &str, base: &str) -> Result<Url, ResolutionError> {
    let base_url = Url::parse(base).map_err(|source| ResolutionError::InvalidBase {
        base: base.to_string(),
        source,
    })?;
    resolve(reference, &base_url)
}
