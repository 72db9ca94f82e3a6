//! HTTP request head and the incremental request parser

use crate::{
    ErrorKind, Method, Uri, UriParser, Version,
    limits::ReqLimits,
};
use std::collections::HashMap;

/// One request header
///
/// Names accumulate as text (the token charset is ASCII); values accumulate
/// as raw bytes and are validated as UTF-8 in one pass when the head is
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub(crate) name: String,
    pub(crate) value: Vec<u8>,
}

impl Header {
    /// Header name as received (case preserved).
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Header value bytes, folding already applied.
    #[inline(always)]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// A parsed HTTP request head
///
/// Filled in incrementally by [`RequestParser::consume`]. `method` and
/// `version` stay `None` until their bytes have been seen, so a request
/// observed mid-parse is honest about what is known so far.
///
/// Headers keep arrival order and duplicates; `params` and `queries` are
/// populated by [`Router::resolve_request`](crate::Router::resolve_request),
/// not by the parser.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub(crate) method: Option<Method>,
    pub(crate) version: Option<Version>,
    pub(crate) uri: Uri,
    pub(crate) headers: Vec<Header>,

    pub(crate) params: HashMap<String, String>,
    pub(crate) queries: HashMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all fields for reuse on the next request of a connection.
    pub fn reset(&mut self) {
        self.method = None;
        self.version = None;
        self.uri.clear();
        self.headers.clear();
        self.params.clear();
        self.queries.clear();
    }

    #[inline(always)]
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    #[inline(always)]
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    #[inline(always)]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline(always)]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// First header with the given name (ASCII case-insensitive), raw bytes.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_slice())
    }

    /// Like [`header`](Self::header), as text. Values are UTF-8 checked at
    /// accept, so this never fails on an accepted request.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).map(|v| {
            // values were validated when the head was accepted
            std::str::from_utf8(v).unwrap_or("")
        })
    }

    /// Route parameter captured by the router (e.g. `:id`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Query string value parsed by the router.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(String::as_str)
    }
}

/// Result of feeding one byte to [`RequestParser::consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The head is not complete yet; feed the next byte.
    InProgress,
    /// The final CRLF was consumed; the request head is complete.
    Accept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    StartLf,
    Method,
    Uri,

    HttpH,
    HttpT1,
    HttpT2,
    HttpP,
    HttpSlash,
    VersionMajor,
    VersionDot,
    VersionMinor,
    LineCr,
    LineLf,

    HeaderStart,
    HeaderName,
    HeaderValue,
    HeaderLf,
    HeaderLws,
    HeaderEnd,
}

/// Incremental HTTP/1.x request head parser
///
/// Strictly one byte per [`consume`](Self::consume) call; every decision
/// depends only on the current state and that byte, so a request split
/// across any read boundaries parses identically to one arriving whole.
///
/// The parser owns no buffer: bytes land directly in the `Request` being
/// filled. One parser serves one connection at a time; call
/// [`reset`](Self::reset) between requests (and after any reject, which is
/// fatal to the in-progress request).
#[derive(Debug, Clone)]
pub struct RequestParser {
    state: State,
    uri: UriParser,
    uri_len: usize,
    // survives between consume() calls while waiting for the minor digit
    version_major: u8,
    limits: ReqLimits,
}

impl RequestParser {
    pub fn new(limits: &ReqLimits) -> Self {
        Self {
            state: State::Start,
            uri: UriParser::new(),
            uri_len: 0,
            version_major: 0,
            limits: limits.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Start;
        self.uri.reset();
        self.uri_len = 0;
        self.version_major = 0;
    }

    /// Feeds one byte of the request head.
    ///
    /// Returns [`ParseStatus::Accept`] exactly once, on the LF of the final
    /// CRLF. Any `Err` is a reject: the request is unusable and the parser
    /// must be [`reset`](Self::reset) before the next request.
    pub fn consume(&mut self, request: &mut Request, byte: u8) -> Result<ParseStatus, ErrorKind> {
        match self.state {
            // Blank lines before the request line are tolerated.
            State::Start => match byte {
                b'\r' => self.state = State::StartLf,
                _ => {
                    self.state = State::Method;
                    request.method = match byte {
                        b'G' => Some(Method::Get),
                        b'H' => Some(Method::Head),
                        b'D' => Some(Method::Delete),
                        b'C' => Some(Method::Connect),
                        b'O' => Some(Method::Options),
                        b'T' => Some(Method::Trace),
                        // POST, PUT or PATCH; resolved by the second byte
                        b'P' => None,
                        _ => return Err(ErrorKind::InvalidMethod),
                    };
                }
            },
            State::StartLf => match byte {
                b'\n' => self.state = State::Start,
                _ => return Err(ErrorKind::InvalidMethod),
            },

            State::Method => match byte {
                b' ' => match request.method {
                    Some(_) => self.state = State::Uri,
                    // a lone 'P' is not a method
                    None => return Err(ErrorKind::InvalidMethod),
                },
                b if is_token(b) => {
                    if request.method.is_none() {
                        request.method = match byte {
                            b'O' => Some(Method::Post),
                            b'U' => Some(Method::Put),
                            b'A' => Some(Method::Patch),
                            _ => return Err(ErrorKind::InvalidMethod),
                        };
                    }
                    // remaining token bytes only keep the state alive; the
                    // method is already determined by its prefix
                }
                _ => return Err(ErrorKind::InvalidMethod),
            },

            State::Uri => match byte {
                b' ' => {
                    request.uri.decode_in_place()?;
                    self.state = State::HttpH;
                }
                _ => {
                    self.uri_len += 1;
                    if self.uri_len > self.limits.uri_size {
                        return Err(ErrorKind::UriTooLong);
                    }
                    self.uri.consume(&mut request.uri, byte)?;
                }
            },

            State::HttpH => match byte {
                b'H' => self.state = State::HttpT1,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::HttpT1 => match byte {
                b'T' => self.state = State::HttpT2,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::HttpT2 => match byte {
                b'T' => self.state = State::HttpP,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::HttpP => match byte {
                b'P' => self.state = State::HttpSlash,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::HttpSlash => match byte {
                b'/' => self.state = State::VersionMajor,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::VersionMajor => match byte {
                b if b.is_ascii_digit() => {
                    self.version_major = byte - b'0';
                    self.state = State::VersionDot;
                }
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::VersionDot => match byte {
                b'.' => self.state = State::VersionMinor,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::VersionMinor => match byte {
                b if b.is_ascii_digit() => {
                    let minor = byte - b'0';
                    request.version = match Version::from_digits(self.version_major, minor) {
                        Some(version) => Some(version),
                        None => return Err(ErrorKind::UnsupportedVersion),
                    };
                    self.state = State::LineCr;
                }
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::LineCr => match byte {
                b'\r' => self.state = State::LineLf,
                _ => return Err(ErrorKind::InvalidVersion),
            },
            State::LineLf => match byte {
                b'\n' => self.state = State::HeaderStart,
                _ => return Err(ErrorKind::InvalidVersion),
            },

            State::HeaderStart => match byte {
                b'\r' => self.state = State::HeaderEnd,
                b if is_token(b) => {
                    if request.headers.len() >= self.limits.header_count {
                        return Err(ErrorKind::TooManyHeaders);
                    }
                    request.headers.push(Header {
                        name: (byte as char).to_string(),
                        value: Vec::new(),
                    });
                    self.state = State::HeaderName;
                }
                _ => return Err(ErrorKind::InvalidHeader),
            },
            State::HeaderName => match byte {
                b':' => self.state = State::HeaderValue,
                b if is_token(b) => {
                    let header = last_header(request);
                    if header.name.len() >= self.limits.header_name_size {
                        return Err(ErrorKind::HeaderTooLarge);
                    }
                    header.name.push(byte as char);
                }
                _ => return Err(ErrorKind::InvalidHeader),
            },
            State::HeaderValue => match byte {
                b'\r' => self.state = State::HeaderLf,
                b' ' | b'\t' if request.headers.last().is_some_and(|h| h.value.is_empty()) => {
                    // leading whitespace after ':' (or a fold) is skipped;
                    // interior whitespace is data
                }
                // HTAB is the one control byte legal inside field content
                b if b == b'\t' || !is_ctl(b) => {
                    let header = last_header(request);
                    if header.value.len() >= self.limits.header_value_size {
                        return Err(ErrorKind::HeaderTooLarge);
                    }
                    header.value.push(byte);
                }
                _ => return Err(ErrorKind::InvalidHeader),
            },
            State::HeaderLf => match byte {
                b'\n' => self.state = State::HeaderLws,
                _ => return Err(ErrorKind::InvalidHeader),
            },
            // The byte after a header CRLF decides between three continuations:
            // fold, next header, or end of section.
            State::HeaderLws => match byte {
                b' ' | b'\t' => {
                    // folded continuation; the fold byte itself is dropped
                    self.state = State::HeaderValue;
                }
                b'\r' => self.state = State::HeaderEnd,
                b if is_token(b) => {
                    if request.headers.len() >= self.limits.header_count {
                        return Err(ErrorKind::TooManyHeaders);
                    }
                    request.headers.push(Header {
                        name: (byte as char).to_string(),
                        value: Vec::new(),
                    });
                    self.state = State::HeaderName;
                }
                _ => return Err(ErrorKind::InvalidHeader),
            },
            State::HeaderEnd => match byte {
                b'\n' => {
                    for header in &request.headers {
                        if simdutf8::basic::from_utf8(&header.value).is_err() {
                            return Err(ErrorKind::InvalidEncoding);
                        }
                    }
                    return Ok(ParseStatus::Accept);
                }
                _ => return Err(ErrorKind::InvalidHeader),
            },
        }

        Ok(ParseStatus::InProgress)
    }
}

// HeaderStart/HeaderLws always push a header before entering the states that
// call this, so the list is never empty here.
#[inline(always)]
fn last_header(request: &mut Request) -> &mut Header {
    let last = request.headers.len() - 1;
    &mut request.headers[last]
}

// token = any CHAR except CTLs or separators (RFC 2616, 2.2)
#[inline(always)]
const fn is_token(byte: u8) -> bool {
    byte > 31 && byte < 127 && !is_separator(byte)
}

#[inline(always)]
const fn is_separator(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'@'
            | b',' | b';' | b':' | b'\\' | b'"'
            | b'/' | b'[' | b']' | b'?' | b'='
            | b'{' | b'}' | b' ' | b'\t'
    )
}

#[inline(always)]
const fn is_ctl(byte: u8) -> bool {
    byte < 32 || byte == 127
}

#[cfg(test)]
mod tests {
    use super::*;

    // Feeds the whole input, asserting Accept fires exactly at the last byte.
    fn parse(input: &[u8]) -> Result<Request, ErrorKind> {
        let mut request = Request::new();
        let mut parser = RequestParser::new(&ReqLimits::default());

        for (i, &byte) in input.iter().enumerate() {
            match parser.consume(&mut request, byte)? {
                ParseStatus::Accept => {
                    assert_eq!(i, input.len() - 1, "accepted before the final byte");
                    return Ok(request);
                }
                ParseStatus::InProgress => {}
            }
        }

        panic!("input exhausted without accept");
    }

    fn expect_reject(input: &[u8]) -> ErrorKind {
        let mut request = Request::new();
        let mut parser = RequestParser::new(&ReqLimits::default());

        for &byte in input {
            if let Err(kind) = parser.consume(&mut request, byte) {
                return kind;
            }
        }

        panic!("input was not rejected");
    }

    #[test]
    fn minimal_request() {
        let request = parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(request.method(), Some(Method::Get));
        assert_eq!(request.version(), Some(Version::Http11));
        assert_eq!(request.uri().path(), "/");
        assert!(request.headers().is_empty());
    }

    #[test]
    fn method_table() {
        #[rustfmt::skip]
        let cases = [
            ("GET",     Method::Get),
            ("HEAD",    Method::Head),
            ("POST",    Method::Post),
            ("PUT",     Method::Put),
            ("DELETE",  Method::Delete),
            ("CONNECT", Method::Connect),
            ("OPTIONS", Method::Options),
            ("TRACE",   Method::Trace),
            ("PATCH",   Method::Patch),
        ];

        for (token, method) in cases {
            let input = format!("{token} / HTTP/1.1\r\n\r\n");
            let request = parse(input.as_bytes()).unwrap();
            assert_eq!(request.method(), Some(method), "{token}");
        }
    }

    #[test]
    fn p_prefix_resolved_by_second_byte() {
        // 'P' alone is ambiguous; a second byte outside {O, U, A} rejects
        // immediately, without waiting for the rest of the token.
        assert_eq!(
            expect_reject(b"PXYZ / HTTP/1.1\r\n\r\n"),
            ErrorKind::InvalidMethod
        );
        // and a space while still undetermined rejects too
        assert_eq!(expect_reject(b"P / HTTP/1.1\r\n\r\n"), ErrorKind::InvalidMethod);
    }

    #[test]
    fn unknown_first_byte_rejects() {
        assert_eq!(expect_reject(b"XGET / HTTP/1.1\r\n\r\n"), ErrorKind::InvalidMethod);
    }

    #[test]
    fn leading_crlf_tolerated() {
        let request = parse(b"\r\n\r\nGET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method(), Some(Method::Get));
    }

    #[test]
    fn version_table() {
        #[rustfmt::skip]
        let cases = [
            ("0.9", Version::Http09),
            ("1.0", Version::Http10),
            ("1.1", Version::Http11),
            ("2.0", Version::Http20),
        ];

        for (digits, version) in cases {
            let input = format!("GET / HTTP/{digits}\r\n\r\n");
            let request = parse(input.as_bytes()).unwrap();
            assert_eq!(request.version(), Some(version), "{digits}");
        }
    }

    #[test]
    fn unrecognized_version_pair_rejects() {
        assert_eq!(
            expect_reject(b"GET / HTTP/1.2\r\n\r\n"),
            ErrorKind::UnsupportedVersion
        );
        assert_eq!(
            expect_reject(b"GET / HTTP/3.0\r\n\r\n"),
            ErrorKind::UnsupportedVersion
        );
    }

    #[test]
    fn major_digit_survives_read_boundaries() {
        // Split exactly between the major digit and the dot; the parser owns
        // the digit, so resuming on a new call cannot lose it.
        let mut request = Request::new();
        let mut parser = RequestParser::new(&ReqLimits::default());

        for &byte in b"GET / HTTP/1" {
            assert_eq!(
                parser.consume(&mut request, byte),
                Ok(ParseStatus::InProgress)
            );
        }
        for &byte in b".1\r\n" {
            assert_eq!(
                parser.consume(&mut request, byte),
                Ok(ParseStatus::InProgress)
            );
        }

        assert_eq!(parser.consume(&mut request, b'\r'), Ok(ParseStatus::InProgress));
        assert_eq!(parser.consume(&mut request, b'\n'), Ok(ParseStatus::Accept));
        assert_eq!(request.version(), Some(Version::Http11));
    }

    #[test]
    fn malformed_version_literal_rejects() {
        assert_eq!(expect_reject(b"GET / HTPP/1.1\r\n\r\n"), ErrorKind::InvalidVersion);
        assert_eq!(expect_reject(b"GET / HTTP-1.1\r\n\r\n"), ErrorKind::InvalidVersion);
        assert_eq!(expect_reject(b"GET / HTTP/11\r\n\r\n"), ErrorKind::InvalidVersion);
    }

    #[test]
    fn headers_keep_order_and_duplicates() {
        let request = parse(
            b"GET / HTTP/1.1\r\n\
              Accept: text/html\r\n\
              X-Tag: one\r\n\
              X-Tag: two\r\n\
              \r\n",
        )
        .unwrap();

        assert_eq!(request.headers().len(), 3);
        assert_eq!(request.headers()[1].value(), b"one");
        assert_eq!(request.headers()[2].value(), b"two");
        // lookup finds the first
        assert_eq!(request.header_str("x-tag"), Some("one"));
    }

    #[test]
    fn folded_value_concatenates_directly() {
        let request = parse(
            b"GET / HTTP/1.1\r\n\
              X-Folded: a\r\n\tb\r\n\
              \r\n",
        )
        .unwrap();

        assert_eq!(request.header_str("X-Folded"), Some("ab"));
    }

    #[test]
    fn value_whitespace_policy() {
        // leading whitespace skipped, interior preserved
        let request = parse(
            b"GET / HTTP/1.1\r\n\
              X-Value:   text with  spaces\r\n\
              \r\n",
        )
        .unwrap();

        assert_eq!(request.header_str("x-value"), Some("text with  spaces"));
    }

    #[test]
    fn interior_tab_is_value_data() {
        // only a tab while the value is still empty is skipped as leading
        // whitespace; once the value started, tabs are part of it
        let request = parse(
            b"GET / HTTP/1.1\r\n\
              X-Cols: a\tb\r\n\
              \r\n",
        )
        .unwrap();

        assert_eq!(request.header_str("x-cols"), Some("a\tb"));
    }

    #[test]
    fn uri_decodes_at_terminating_space() {
        let request = parse(b"GET /a%20b?q=%2B1 HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(request.uri().path(), "/a b");
        assert_eq!(request.uri().query(), "q=+1");
    }

    #[test]
    fn limits_reject_at_the_crossing_byte() {
        let limits = ReqLimits {
            uri_size: 8,
            header_count: 1,
            ..ReqLimits::default()
        };

        let mut request = Request::new();
        let mut parser = RequestParser::new(&limits);
        let mut result = Ok(ParseStatus::InProgress);
        for &byte in b"GET /123456789 HTTP/1.1\r\n\r\n" {
            result = parser.consume(&mut request, byte);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(ErrorKind::UriTooLong));

        let mut request = Request::new();
        let mut parser = RequestParser::new(&limits);
        let mut result = Ok(ParseStatus::InProgress);
        for &byte in b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n".iter() {
            result = parser.consume(&mut request, byte);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(ErrorKind::TooManyHeaders));
    }

    #[test]
    fn header_value_rejects_control_bytes() {
        assert_eq!(
            expect_reject(b"GET / HTTP/1.1\r\nX: a\x00b\r\n\r\n"),
            ErrorKind::InvalidHeader
        );
    }

    #[test]
    fn non_utf8_header_value_rejects_at_accept() {
        assert_eq!(
            expect_reject(b"GET / HTTP/1.1\r\nX: a\xFFb\r\n\r\n"),
            ErrorKind::InvalidEncoding
        );
    }

    #[test]
    fn byte_at_a_time_equals_whole_buffer() {
        // Same request fed in 1-byte and 3-byte chunks must produce the same
        // parsed head.
        let input = b"POST /items?x=1 HTTP/1.0\r\nHost: ex\r\n\r\n";

        let whole = parse(input).unwrap();

        let mut request = Request::new();
        let mut parser = RequestParser::new(&ReqLimits::default());
        let mut accepted = false;
        for chunk in input.chunks(3) {
            for &byte in chunk {
                if parser.consume(&mut request, byte).unwrap() == ParseStatus::Accept {
                    accepted = true;
                }
            }
        }

        assert!(accepted);
        assert_eq!(request.method(), whole.method());
        assert_eq!(request.version(), whole.version());
        assert_eq!(request.uri(), whole.uri());
        assert_eq!(request.headers(), whole.headers());
    }

    #[test]
    fn reset_allows_reuse_after_reject() {
        let mut request = Request::new();
        let mut parser = RequestParser::new(&ReqLimits::default());

        assert!(parser.consume(&mut request, b'X').is_err());

        parser.reset();
        request.reset();

        for &byte in b"GET / HTTP/1.1\r\n\r" {
            assert_eq!(
                parser.consume(&mut request, byte),
                Ok(ParseStatus::InProgress)
            );
        }
        assert_eq!(parser.consume(&mut request, b'\n'), Ok(ParseStatus::Accept));
    }
}
