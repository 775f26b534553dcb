/// An error that occurred while parsing or compiling a regular expression.
///
/// The error message is meant for humans. For parse errors it embeds the
/// pattern with a `<<<HERE>>>` marker at the position where parsing failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

/// The broad category of a compilation failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The pattern's syntax is invalid.
    Parse,
    /// The pattern parsed or compiled to more nodes or instructions than
    /// the 16-bit program representation can address.
    CompiledTooBig,
}

impl Error {
    pub(crate) fn parse(msg: String) -> Error {
        Error { kind: ErrorKind::Parse, msg }
    }

    pub(crate) fn too_big(msg: String) -> Error {
        Error { kind: ErrorKind::CompiledTooBig, msg }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.msg)
    }
}
