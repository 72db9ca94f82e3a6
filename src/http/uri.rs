//! Request URI value, incremental URI parser, and percent coding

use crate::ErrorKind;

/// A parsed request URI
///
/// Fields are accumulated byte by byte while parsing and percent-decoded in
/// place once the enclosing request parser sees the terminating space. Every
/// accessor therefore returns decoded text.
///
/// Both origin form (`/path?query#frag`) and absolute form
/// (`scheme://host:port/path?query#frag`) are recognized; fields a request
/// does not carry stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    scheme: String,
    host: String,
    port: String,
    abs_path: String,
    query: String,
    fragment: String,
}

impl Uri {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.scheme.clear();
        self.host.clear();
        self.port.clear();
        self.abs_path.clear();
        self.query.clear();
        self.fragment.clear();
    }

    /// URI scheme (e.g. `http`), empty for origin-form requests.
    #[inline(always)]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host component, empty for origin-form requests.
    #[inline(always)]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, parsed lazily from its digit text.
    ///
    /// `None` when the URI carries no port or the digits overflow `u16`.
    #[inline]
    pub fn port(&self) -> Option<u16> {
        self.port.parse().ok()
    }

    /// Absolute path (e.g. `/users/42`), decoded.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.abs_path
    }

    /// Query string without the leading `?`, decoded. Empty if absent.
    #[inline(always)]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fragment without the leading `#`, decoded. Empty if absent.
    #[inline(always)]
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    // Decodes every captured field exactly once, after capture is complete.
    // The port is digit text and never carries escapes.
    pub(crate) fn decode_in_place(&mut self) -> Result<(), ErrorKind> {
        self.scheme = percent_decode(&self.scheme)?;
        self.host = percent_decode(&self.host)?;
        self.abs_path = percent_decode(&self.abs_path)?;
        self.query = percent_decode(&self.query)?;
        self.fragment = percent_decode(&self.fragment)?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UriState {
    Start,
    Scheme,
    Slash,
    SlashSlash,
    Host,
    Port,
    AbsPath,
    Query,
    Fragment,
}

/// Incremental URI parser
///
/// Consumes one byte per call and appends it to the field the current state
/// selects. There is no accept state: the URI ends when the caller stops
/// feeding bytes (the request parser stops at the space before `HTTP/`).
/// Any byte no transition matches is a reject, and a reject is fatal until
/// [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct UriParser {
    state: UriState,
}

impl UriParser {
    pub fn new() -> Self {
        Self {
            state: UriState::Start,
        }
    }

    pub fn reset(&mut self) {
        self.state = UriState::Start;
    }

    /// Feeds one byte, appending it to the matching field of `uri`.
    ///
    /// `Ok(())` means in progress; `Err(InvalidUri)` means the byte fits no
    /// transition from the current state.
    pub fn consume(&mut self, uri: &mut Uri, byte: u8) -> Result<(), ErrorKind> {
        match self.state {
            UriState::Start => match byte {
                b'/' => {
                    self.state = UriState::AbsPath;
                    uri.abs_path.push(byte as char);
                }
                b'*' => {
                    // Asterisk form ("OPTIONS * HTTP/1.1") parses as a path.
                    self.state = UriState::AbsPath;
                    uri.abs_path.push(byte as char);
                }
                b if b.is_ascii_alphabetic() => {
                    self.state = UriState::Scheme;
                    uri.scheme.push(byte as char);
                }
                _ => return Err(ErrorKind::InvalidUri),
            },

            UriState::Scheme => match byte {
                b':' => self.state = UriState::Slash,
                b if b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.' => {
                    uri.scheme.push(byte as char);
                }
                _ => return Err(ErrorKind::InvalidUri),
            },
            UriState::Slash => match byte {
                b'/' => self.state = UriState::SlashSlash,
                _ => return Err(ErrorKind::InvalidUri),
            },
            UriState::SlashSlash => match byte {
                b'/' => self.state = UriState::Host,
                _ => return Err(ErrorKind::InvalidUri),
            },

            UriState::Host => match byte {
                b':' => self.state = UriState::Port,
                b'/' => {
                    self.state = UriState::AbsPath;
                    uri.abs_path.push(byte as char);
                }
                b if is_uri_byte(b) => uri.host.push(byte as char),
                _ => return Err(ErrorKind::InvalidUri),
            },
            UriState::Port => match byte {
                b'/' => {
                    self.state = UriState::AbsPath;
                    uri.abs_path.push(byte as char);
                }
                b if b.is_ascii_digit() => uri.port.push(byte as char),
                _ => return Err(ErrorKind::InvalidUri),
            },

            UriState::AbsPath => match byte {
                b'?' => self.state = UriState::Query,
                b'#' => self.state = UriState::Fragment,
                b if is_uri_byte(b) => uri.abs_path.push(byte as char),
                _ => return Err(ErrorKind::InvalidUri),
            },
            UriState::Query => match byte {
                b'#' => self.state = UriState::Fragment,
                b if is_uri_byte(b) => uri.query.push(byte as char),
                _ => return Err(ErrorKind::InvalidUri),
            },
            UriState::Fragment => match byte {
                b if is_uri_byte(b) => uri.fragment.push(byte as char),
                _ => return Err(ErrorKind::InvalidUri),
            },
        }

        Ok(())
    }
}

impl Default for UriParser {
    fn default() -> Self {
        Self::new()
    }
}

// RFC 2396 unreserved plus the reserved/mark set used verbatim in URIs,
// plus '%' so escapes pass through to the decode step.
#[inline(always)]
pub(crate) const fn is_uri_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'_' | b'.' | b'~'
                | b'!' | b'*' | b'\'' | b'(' | b')' | b';' | b':' | b'@'
                | b'&' | b'=' | b'+' | b'$' | b',' | b'/' | b'?' | b'#'
                | b'[' | b']' | b'%'
        )
}

#[inline(always)]
const fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encodes `text`, escaping everything outside the unreserved set.
pub fn percent_encode(text: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0F) as usize] as char);
        }
    }

    out
}

/// Percent-decodes `text` strictly.
///
/// Every `%` must be followed by exactly two hex digits, and the decoded
/// bytes must form valid UTF-8. Anything else is [`ErrorKind::InvalidEncoding`].
pub fn percent_decode(text: &str) -> Result<String, ErrorKind> {
    let bytes = text.as_bytes();

    // Fast path: nothing to decode.
    let Some(first) = memchr::memchr(b'%', bytes) else {
        return Ok(text.to_owned());
    };

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&bytes[..first]);

    let mut rest = &bytes[first..];
    loop {
        // rest[0] is '%' here
        let (hi, lo) = match rest {
            [_, hi, lo, ..] => (hex_value(*hi), hex_value(*lo)),
            _ => return Err(ErrorKind::InvalidEncoding),
        };
        match (hi, lo) {
            (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
            _ => return Err(ErrorKind::InvalidEncoding),
        }
        rest = &rest[3..];

        match memchr::memchr(b'%', rest) {
            Some(next) => {
                out.extend_from_slice(&rest[..next]);
                rest = &rest[next..];
            }
            None => {
                out.extend_from_slice(rest);
                break;
            }
        }
    }

    String::from_utf8(out).map_err(|_| ErrorKind::InvalidEncoding)
}

#[inline(always)]
const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Uri, ErrorKind> {
        let mut uri = Uri::new();
        let mut parser = UriParser::new();

        for &byte in text.as_bytes() {
            parser.consume(&mut uri, byte)?;
        }
        uri.decode_in_place()?;

        Ok(uri)
    }

    #[test]
    fn origin_form() {
        let uri = parse("/users/42?sort=name#top").unwrap();

        assert_eq!(uri.path(), "/users/42");
        assert_eq!(uri.query(), "sort=name");
        assert_eq!(uri.fragment(), "top");
        assert_eq!(uri.scheme(), "");
        assert_eq!(uri.host(), "");
        assert_eq!(uri.port(), None);
    }

    #[test]
    fn absolute_form() {
        let uri = parse("http://example.com:8080/a/b?x=1").unwrap();

        assert_eq!(uri.scheme(), "http");
        assert_eq!(uri.host(), "example.com");
        assert_eq!(uri.port(), Some(8080));
        assert_eq!(uri.path(), "/a/b");
        assert_eq!(uri.query(), "x=1");
    }

    #[test]
    fn absolute_form_without_port() {
        let uri = parse("http://example.com/").unwrap();

        assert_eq!(uri.host(), "example.com");
        assert_eq!(uri.port(), None);
        assert_eq!(uri.path(), "/");
    }

    #[test]
    fn decoding_runs_once_per_field() {
        let uri = parse("/a%20b?q=%2B1").unwrap();

        assert_eq!(uri.path(), "/a b");
        assert_eq!(uri.query(), "q=+1");
    }

    #[test]
    fn rejects() {
        #[rustfmt::skip]
        let cases = [
            " /x",             // leading space
            "/a b",            // raw space mid-path
            "http:/x",         // single slash after scheme
            "http//x",         // '/' is not a scheme byte
            "http://ex:80x/",  // non-digit in port
            "1http://x/",      // scheme must start alphabetic
        ];

        for case in cases {
            assert_eq!(parse(case), Err(ErrorKind::InvalidUri), "{case:?}");
        }
    }

    #[test]
    fn malformed_escapes_reject() {
        #[rustfmt::skip]
        let cases = ["/a%", "/a%2", "/a%2G", "/a%gg"];

        for case in cases {
            assert_eq!(parse(case), Err(ErrorKind::InvalidEncoding), "{case:?}");
        }
    }

    #[test]
    fn decoded_bytes_must_be_utf8() {
        assert_eq!(parse("/a%FF"), Err(ErrorKind::InvalidEncoding));
    }

    #[test]
    fn encode_round_trip() {
        let original = "a b+c/d?e";
        let encoded = percent_encode(original);

        assert_eq!(encoded, "a%20b%2Bc%2Fd%3Fe");
        assert_eq!(percent_decode(&encoded).unwrap(), original);
    }

    #[test]
    fn split_escape_survives_read_boundaries() {
        // The parser accumulates raw bytes; decode happens only after the
        // whole field arrived, so an escape split across reads is whole by
        // the time it is interpreted.
        let mut uri = Uri::new();
        let mut parser = UriParser::new();

        for chunk in ["/a%", "2", "0b"] {
            for &byte in chunk.as_bytes() {
                parser.consume(&mut uri, byte).unwrap();
            }
        }
        uri.decode_in_place().unwrap();

        assert_eq!(uri.path(), "/a b");
    }
}
