use crate::Result;

/// An error that can occur in Polychrome.
#[derive(Debug)]
pub enum Error {
    /// A constraint rule could not be parsed (too many tokens, no value).
    MalformedConstraint(String),

    /// A constraint rule used a comparative symbol that is not recognized.
    UnknownComparative(String),

    /// A blueprint attribute declared a type name outside the supported set.
    /// Rejected at load time rather than silently ignored.
    UnknownAttributeType {
        blueprint: String,
        attribute: String,
        ty: String,
    },

    /// A blueprint name was referenced that is not present in the ontology.
    UnknownBlueprint(String),

    /// A relationship alias was registered twice on the same blueprint.
    DuplicateRelationship { blueprint: String, alias: String },

    /// An [`HttpError`] was constructed with a code outside `[400, 500]`.
    HttpCodeOutOfRange(u16),

    /// A typed HTTP error surfaced by a handler (404, 412, ...).
    Http(HttpError),

    /// A payload failed schema validation.
    Validation { field: String, message: String },

    /// A storage adapter was asked to upload without a destination name.
    MissingUploadDestination,

    /// Opaque store-layer or storage-layer failure. Passed through
    /// verbatim, never interpreted or retried.
    Store(anyhow::Error),
}

impl Error {
    /// Shorthand for the 404 the id-scoped handlers raise.
    pub fn not_found() -> Error {
        Error::Http(HttpError::not_found("Document(s) not found."))
    }

    /// The HTTP status code carried by this error, if it is an HTTP error.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            Error::Http(err) => Some(err.code()),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Error::MalformedConstraint(msg) => write!(f, "malformed constraint, {msg}"),
            Error::UnknownComparative(op) => {
                write!(f, "malformed constraint, unknown comparative operation ({op})")
            }
            Error::UnknownAttributeType {
                blueprint,
                attribute,
                ty,
            } => write!(
                f,
                "unknown attribute type `{ty}` on {blueprint}.{attribute}"
            ),
            Error::UnknownBlueprint(name) => write!(f, "unknown blueprint `{name}`"),
            Error::DuplicateRelationship { blueprint, alias } => write!(
                f,
                "relationship alias `{alias}` already exists on blueprint `{blueprint}`"
            ),
            Error::HttpCodeOutOfRange(code) => write!(
                f,
                "error code {code} not within valid http error range [400, 500]"
            ),
            Error::Http(err) => core::fmt::Display::fmt(err, f),
            Error::Validation { field, message } => write!(f, "validation failed: {field}: {message}"),
            Error::MissingUploadDestination => f.write_str("no destination for uploaded file"),
            Error::Store(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::Store(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Store(anyhow::Error::from(err))
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Error {
        Error::Http(err)
    }
}

/// A structure that can be used for http friendly errors throughout the
/// handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    code: u16,
    message: String,
}

impl HttpError {
    /// Create an HTTP error with an arbitrary status code.
    ///
    /// The code must lie within the closed range `[400, 500]`; anything
    /// outside that range is a programming error and fails at
    /// construction.
    pub fn new(message: impl Into<String>, code: u16) -> Result<HttpError> {
        if !(400..=500).contains(&code) {
            return Err(Error::HttpCodeOutOfRange(code));
        }

        Ok(HttpError {
            code,
            message: message.into(),
        })
    }

    /// A 404, for id-scoped operations that matched zero records.
    pub fn not_found(message: impl Into<String>) -> HttpError {
        HttpError {
            code: 404,
            message: message.into(),
        }
    }

    /// A 412, for POST constraint validation failures.
    pub fn precondition_failed(message: impl Into<String>) -> HttpError {
        HttpError {
            code: 412,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl core::fmt::Display for HttpError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for HttpError {}
