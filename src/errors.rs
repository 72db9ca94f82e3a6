//! Parse reject reasons and their canned HTTP error responses.

use crate::Version;
use std::{error, fmt, io};

/// Reasons a request is rejected.
///
/// Returned by [`RequestParser::consume`](crate::RequestParser::consume) (and
/// [`UriParser::consume`](crate::UriParser::consume)) in place of the reject
/// status: the reason is fatal to the in-progress request, and the parser
/// instance must be [reset](crate::RequestParser::reset) before reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A byte that cannot start or continue a known method token.
    InvalidMethod,

    /// A byte outside the URI character set, or a malformed URI structure.
    InvalidUri,
    /// The accumulated URI exceeded [`ReqLimits::uri_size`](crate::limits::ReqLimits::uri_size).
    UriTooLong,

    /// The request line diverged from `"HTTP/" DIGIT "." DIGIT CRLF`.
    InvalidVersion,
    /// A well-formed digit pair outside the recognized set
    /// (`0.9`, `1.0`, `1.1`, `2.0`).
    UnsupportedVersion,

    /// A malformed header line (bad name byte, control byte in a value,
    /// or a stray CR/LF).
    InvalidHeader,
    /// More headers than [`ReqLimits::header_count`](crate::limits::ReqLimits::header_count).
    TooManyHeaders,
    /// A header name or value over its configured size limit.
    HeaderTooLarge,

    /// A broken percent escape, or decoded text that is not UTF-8.
    InvalidEncoding,

    /// The admission queue was full.
    ServiceUnavailable,
    /// An I/O failure on the connection.
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        pub(crate) const fn as_http(
            &self,
            version: Version,
            json: bool,
        ) -> &'static [u8] {
            match (json, self, version) { $(
                (true, Self::$name { .. }, Version::Http11 | Version::Http20) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http11 | Version::Http20) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (true, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (_, Self::$name { .. }, Version::Http09) => concat!(
                    "ERROR: ", $status_code, "\r\n"
                ),
            )* }.as_bytes()
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidMethod: "400 Bad Request", "55"
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;

        InvalidUri: "400 Bad Request", "51"
            => r#"{"error":"Invalid URI format","code":"INVALID_URI"}"#;
        UriTooLong: "414 URI Too Long", "46"
            => r#"{"error":"URI too long","code":"URI_TOO_LONG"}"#;

        InvalidVersion: "400 Bad Request", "57"
            => r#"{"error":"Invalid HTTP version","code":"INVALID_VERSION"}"#;
        UnsupportedVersion: "505 HTTP Version Not Supported", "67"
            => r#"{"error":"HTTP version not supported","code":"UNSUPPORTED_VERSION"}"#;

        InvalidHeader: "400 Bad Request", "57"
            => r#"{"error":"Invalid header format","code":"INVALID_HEADER"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        HeaderTooLarge: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Header too large","code":"HEADER_TOO_LARGE"}"#;

        InvalidEncoding: "400 Bad Request", "59"
            => r#"{"error":"Invalid text encoding","code":"INVALID_ENCODING"}"#;

        ServiceUnavailable: "503 Service Unavailable", "72"
            => r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#;
        Io: "503 Service Unavailable", "48"
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

/// An [`io::Error`] comparable by kind, so parse results stay testable.
#[derive(Debug)]
pub struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl Eq for IoError {}

impl Clone for IoError {
    fn clone(&self) -> Self {
        IoError(io::Error::from(self.0.kind()))
    }
}
