#![forbid(unsafe_code)]

//! Error taxonomy for invoking and refreshing refreshable functions.
//!
//! Argument-binding problems are detected by explicit validation against the
//! declared parameter list and reported with the offending function and
//! parameter names. Body failures are wrapped so the caller can tell a bad
//! call site apart from a bug inside the function being rebuilt.

use thiserror::Error;

/// Error type bodies return; anything that can be boxed as a std error.
pub type BodyError = Box<dyn std::error::Error>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The same parameter arrived both positionally and by keyword.
    #[error(
        "`{parameter}` needs to be consistently passed to `{function}` \
         either as positional or as keyword argument"
    )]
    InconsistentArgument { function: String, parameter: String },

    /// A keyword argument does not match any declared parameter.
    #[error("`{function}` got an unexpected keyword argument `{parameter}`")]
    UnknownKeyword { function: String, parameter: String },

    /// More positional arguments than declared parameters.
    #[error("`{function}` takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        function: String,
        expected: usize,
        given: usize,
    },

    /// The function body itself failed during a run.
    #[error("`{function}` body failed: {source}")]
    Body {
        function: String,
        #[source]
        source: BodyError,
    },
}

impl Error {
    pub(crate) fn body(function: &str, source: BodyError) -> Self {
        Self::Body { function: function.to_string(), source }
    }
}

// ─────────────────────────────────── Tests ──────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_errors_name_function_and_parameter() {
        let err = Error::InconsistentArgument {
            function: "show_info".into(),
            parameter: "name".into(),
        };
        assert_eq!(
            err.to_string(),
            "`name` needs to be consistently passed to `show_info` \
             either as positional or as keyword argument"
        );

        let err = Error::UnknownKeyword {
            function: "show_info".into(),
            parameter: "extra".into(),
        };
        assert_eq!(
            err.to_string(),
            "`show_info` got an unexpected keyword argument `extra`"
        );

        let err = Error::TooManyPositional {
            function: "show_info".into(),
            expected: 1,
            given: 3,
        };
        assert_eq!(
            err.to_string(),
            "`show_info` takes 1 positional arguments but 3 were given"
        );
    }

    #[test]
    fn body_errors_keep_their_source() {
        let err = Error::body("render", "boom".into());
        assert_eq!(err.to_string(), "`render` body failed: boom");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("boom"));
    }
}
