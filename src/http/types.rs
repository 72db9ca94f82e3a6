//! Core HTTP protocol types

use std::fmt;

// METHOD

/// HTTP request methods
///
/// # References
///
/// - [RFC 7231, Section 4](https://datatracker.ietf.org/doc/html/rfc7231#section-4)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method - transfer a current representation of the target resource
    /// [[RFC7231, Section 4.3.1](https://tools.ietf.org/html/rfc7231#section-4.3.1)]
    Get,
    /// HEAD method - same as GET but without response body
    /// [[RFC7231, Section 4.3.2](https://tools.ietf.org/html/rfc7231#section-4.3.2)]
    Head,
    /// POST method - perform resource-specific processing on the request payload
    /// [[RFC7231, Section 4.3.3](https://tools.ietf.org/html/rfc7231#section-4.3.3)]
    Post,
    /// PUT method - replace all current representations of the target resource with the request payload
    /// [[RFC7231, Section 4.3.4](https://tools.ietf.org/html/rfc7231#section-4.3.4)]
    Put,
    /// DELETE method - remove all current representations of the target resource
    /// [[RFC7231, Section 4.3.5](https://tools.ietf.org/html/rfc7231#section-4.3.5)]
    Delete,
    /// CONNECT method - establish a tunnel to the server identified by the target resource
    /// [[RFC7231, Section 4.3.6](https://tools.ietf.org/html/rfc7231#section-4.3.6)]
    Connect,
    /// OPTIONS method - describe the communication options for the target resource
    /// [[RFC7231, Section 4.3.7](https://tools.ietf.org/html/rfc7231#section-4.3.7)]
    Options,
    /// TRACE method - perform a message loop-back test along the path to the target resource
    /// [[RFC7231, Section 4.3.8](https://tools.ietf.org/html/rfc7231#section-4.3.8)]
    Trace,
    /// PATCH method - apply partial modifications to a resource
    /// [[RFC5789, Section 2](https://tools.ietf.org/html/rfc5789#section-2)]
    Patch,
}

impl Method {
    /// Number of method variants; sizes the router's per-method table.
    pub(crate) const COUNT: usize = 9;

    pub(crate) const ALL: [Method; Method::COUNT] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Connect,
        Method::Options,
        Method::Trace,
        Method::Patch,
    ];

    #[inline(always)]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Returns the canonical uppercase token for this method.
    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// VERSION

/// HTTP protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/0.9 - The original protocol (1991)
    ///
    /// [Original specification](https://www.w3.org/Protocols/HTTP/AsImplemented.html)
    Http09,

    /// HTTP/1.0 - Added headers and status codes (1996)
    ///
    /// [RFC 1945](https://tools.ietf.org/html/rfc1945)
    Http10,

    /// HTTP/1.1 - Current standard with keep-alive (1999)
    ///
    /// [RFC 7230](https://tools.ietf.org/html/rfc7230) and related
    Http11,

    /// HTTP/2.0 - Recognized on the request line, but this stack only
    /// speaks 1.x on the wire; requests carrying it are answered with `505`.
    ///
    /// [RFC 9113](https://datatracker.ietf.org/doc/html/rfc9113)
    Http20,
}

impl Version {
    /// Maps a `major.minor` digit pair from the request line to a version.
    ///
    /// Fixed table: anything outside it is unsupported and the parser
    /// rejects the request instead of leaving the version unset.
    #[inline(always)]
    pub(crate) const fn from_digits(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (0, 9) => Some(Version::Http09),
            (1, 0) => Some(Version::Http10),
            (1, 1) => Some(Version::Http11),
            (2, 0) => Some(Version::Http20),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Version::Http09 => "HTTP/0.9",
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
            Version::Http20 => "HTTP/2.0",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])+
        $name:ident = ($num:expr, $str:expr);
    )+) => {
        /// HTTP status codes emitted by this stack
        ///
        /// A subset of [RFC 9110, Section 15](https://datatracker.ietf.org/doc/html/rfc9110#section-15):
        /// the codes the connection layer and error mapping actually produce,
        /// plus the usual success codes for application handlers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])+
            $name = $num,
        )+ }

        impl StatusCode {
            // Returns the first response line as bytes (e.g., `b"HTTP/1.1 200 OK\r\n"`).
            // HTTP/2.0 requests are answered over the 1.1 wire format.
            #[inline]
            pub(crate) const fn into_first_line(self, version: Version) -> &'static [u8] {
                match (self, version) { $(
                    (StatusCode::$name, Version::Http11 | Version::Http20) => {
                        concat!("HTTP/1.1 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http10) => {
                        concat!("HTTP/1.0 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http09) => {
                        concat!(" ", $num, " ", $str, "\r\n").as_bytes()
                    },
                )+ }
            }
        }
    }
}

set_status_codes! {
    /// [[RFC9110, Section 15.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.1)]
    Ok = (200, "OK");
    /// [[RFC9110, Section 15.3.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.2)]
    Created = (201, "Created");
    /// [[RFC9110, Section 15.3.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.3)]
    Accepted = (202, "Accepted");
    /// [[RFC9110, Section 15.3.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.5)]
    NoContent = (204, "No Content");

    /// [[RFC9110, Section 15.5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.1)]
    BadRequest = (400, "Bad Request");
    /// [[RFC9110, Section 15.5.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.2)]
    Unauthorized = (401, "Unauthorized");
    /// [[RFC9110, Section 15.5.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.4)]
    Forbidden = (403, "Forbidden");
    /// [[RFC9110, Section 15.5.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.5)]
    NotFound = (404, "Not Found");
    /// [[RFC9110, Section 15.5.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.6)]
    MethodNotAllowed = (405, "Method Not Allowed");
    /// [[RFC9110, Section 15.5.9](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.9)]
    RequestTimeout = (408, "Request Timeout");
    /// [[RFC9110, Section 15.5.15](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.15)]
    UriTooLong = (414, "URI Too Long");
    /// [[RFC6585, Section 5](https://datatracker.ietf.org/doc/html/rfc6585#section-5)]
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");

    /// [[RFC9110, Section 15.6.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.1)]
    InternalServerError = (500, "Internal Server Error");
    /// [[RFC9110, Section 15.6.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.4)]
    ServiceUnavailable = (503, "Service Unavailable");
    /// [[RFC9110, Section 15.6.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.6)]
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_table_is_dense() {
        for (i, method) in Method::ALL.iter().enumerate() {
            assert_eq!(method.index(), i);
        }
        assert_eq!(Method::ALL.len(), Method::COUNT);
    }

    #[test]
    fn version_pairs() {
        #[rustfmt::skip]
        let cases = [
            ((0, 9), Some(Version::Http09)),
            ((1, 0), Some(Version::Http10)),
            ((1, 1), Some(Version::Http11)),
            ((2, 0), Some(Version::Http20)),

            ((0, 0), None),
            ((1, 2), None),
            ((2, 1), None),
            ((3, 0), None),
            ((9, 9), None),
        ];

        for ((major, minor), expected) in cases {
            assert_eq!(Version::from_digits(major, minor), expected);
        }
    }

    #[test]
    fn status_first_line() {
        assert_eq!(
            StatusCode::Ok.into_first_line(Version::Http11),
            b"HTTP/1.1 200 OK\r\n"
        );
        assert_eq!(
            StatusCode::NotFound.into_first_line(Version::Http10),
            b"HTTP/1.0 404 Not Found\r\n"
        );
        assert_eq!(StatusCode::Ok.into_first_line(Version::Http09), b" 200 OK\r\n");
        assert_eq!(
            StatusCode::HttpVersionNotSupported.into_first_line(Version::Http20),
            b"HTTP/1.1 505 HTTP Version Not Supported\r\n"
        );
    }
}
