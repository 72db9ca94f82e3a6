//! HTTP response builder with reusable buffers

use crate::{
    http::types::{StatusCode, Version},
    limits::RespLimits,
};

/// HTTP response builder passed to handlers through
/// [`Context`](crate::Context).
///
/// Unlike a write-through builder, nothing is serialized while handlers run:
/// middleware earlier in a pipeline may add headers before a later handler
/// decides the status. The wire bytes are produced once, by
/// [`payload`](Response::payload), after the whole pipeline finished.
///
/// An untouched response serializes as `200 OK` with an empty body.
///
/// # Examples
/// ```
/// # let mut response = trellis_web::Response::for_tests();
/// use trellis_web::StatusCode;
///
/// response
///     .status(StatusCode::Ok)
///     .header("content-type", "text/html")
///     .body("<h1>Hello World</h1>");
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    head: Vec<u8>,
    body: Vec<u8>,
    out: Vec<u8>,
    pub(crate) version: Version,
    pub(crate) keep_alive: bool,
}

impl Response {
    #[inline(always)]
    pub(crate) fn new(limits: &RespLimits) -> Self {
        Self {
            status: StatusCode::Ok,
            head: Vec::with_capacity(limits.default_capacity),
            body: Vec::with_capacity(limits.default_capacity),
            out: Vec::with_capacity(limits.default_capacity),
            version: Version::Http11,
            keep_alive: true,
        }
    }

    /// A throwaway instance for doc tests and handler unit tests.
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self::new(&RespLimits::default())
    }

    #[inline]
    pub(crate) fn reset(&mut self, limits: &RespLimits) {
        reset_buffer(&mut self.head, limits);
        reset_buffer(&mut self.body, limits);
        reset_buffer(&mut self.out, limits);

        self.status = StatusCode::Ok;
        self.version = Version::Http11;
        self.keep_alive = true;
    }

    /// Sets the status line. May be called at any point before the response
    /// is written; the last call wins.
    #[inline]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Adds a header line.
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADERS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    #[inline]
    pub fn header(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.head.extend_from_slice(name.as_ref());
        self.head.extend_from_slice(b": ");
        self.head.extend_from_slice(value.as_ref());
        self.head.extend_from_slice(b"\r\n");
        self
    }

    /// Forces the connection to close after this response.
    #[inline]
    pub fn close(&mut self) -> &mut Self {
        self.keep_alive = false;
        self
    }

    /// Appends to the response body. Repeated calls accumulate, so pipeline
    /// stages can each contribute.
    #[inline]
    pub fn body(&mut self, data: impl AsRef<[u8]>) {
        self.body.extend_from_slice(data.as_ref());
    }

    /// Serializes the response into wire bytes.
    ///
    /// HTTP/0.9 responses are the raw body; HTTP/1.x responses get a status
    /// line, the accumulated headers, a `connection` header where the
    /// version defaults disagree with `keep_alive`, and `content-length`.
    pub(crate) fn payload(&mut self) -> &[u8] {
        if self.version == Version::Http09 {
            return &self.body;
        }

        self.out.clear();
        self.out
            .extend_from_slice(self.status.into_first_line(self.version));

        if let Some(value) = self.connection_header() {
            self.out.extend_from_slice(b"connection: ");
            self.out.extend_from_slice(value);
            self.out.extend_from_slice(b"\r\n");
        }

        self.out.extend_from_slice(&self.head);

        self.out.extend_from_slice(b"content-length: ");
        let (digits, start) = usize_to_bytes(self.body.len());
        self.out.extend_from_slice(&digits[start..]);
        self.out.extend_from_slice(b"\r\n\r\n");

        self.out.extend_from_slice(&self.body);
        &self.out
    }

    // Emitted only where the version's keep-alive default disagrees with
    // the requested behavior.
    #[inline(always)]
    const fn connection_header(&self) -> Option<&'static [u8]> {
        match (self.version, self.keep_alive) {
            (Version::Http11, true) => None,
            (Version::Http11, false) => Some(b"close"),
            (Version::Http10, true) => Some(b"keep-alive"),
            (Version::Http10, false) => None,
            _ => None,
        }
    }
}

#[inline(always)]
fn reset_buffer(buffer: &mut Vec<u8>, limits: &RespLimits) {
    if buffer.capacity() > limits.max_capacity {
        *buffer = Vec::with_capacity(limits.default_capacity);
    } else {
        buffer.clear();
    }
}

#[inline]
const fn usize_to_bytes(mut n: usize) -> ([u8; 20], usize) {
    let mut buffer = [b'0'; 20];
    let mut i = 20;

    if n == 0 {
        return (buffer, 19);
    }

    while n > 0 {
        i -= 1;
        buffer[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }

    (buffer, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(response: &mut Response) -> String {
        String::from_utf8(response.payload().to_vec()).unwrap()
    }

    #[test]
    fn untouched_is_empty_ok() {
        let mut resp = Response::new(&RespLimits::default());
        assert_eq!(text(&mut resp), "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn full_sequence() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::NotFound)
            .header("content-type", "text/plain")
            .body("missing");

        assert_eq!(
            text(&mut resp),
            "HTTP/1.1 404 Not Found\r\n\
             content-type: text/plain\r\n\
             content-length: 7\r\n\r\n\
             missing"
        );
    }

    #[test]
    fn status_after_headers_still_wins() {
        // A terminal handler may set the status after middleware already
        // added headers.
        let mut resp = Response::new(&RespLimits::default());
        resp.header("x-stage", "auth");
        resp.status(StatusCode::Forbidden);

        assert!(text(&mut resp).starts_with("HTTP/1.1 403 Forbidden\r\n"));
    }

    #[test]
    fn connection_header_table() {
        #[rustfmt::skip]
        let cases = [
            (Version::Http11, true,  None),
            (Version::Http11, false, Some("close")),
            (Version::Http10, true,  Some("keep-alive")),
            (Version::Http10, false, None),
        ];

        for (version, keep_alive, expected) in cases {
            let mut resp = Response::new(&RespLimits::default());
            resp.version = version;
            resp.keep_alive = keep_alive;

            let out = text(&mut resp);
            let found = out
                .lines()
                .find_map(|l| l.strip_prefix("connection: "));
            assert_eq!(found, expected, "{version} keep_alive={keep_alive}");
        }
    }

    #[test]
    fn http09_is_raw_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.version = Version::Http09;
        resp.body("raw data");

        assert_eq!(resp.payload(), b"raw data");
    }

    #[test]
    fn body_accumulates_across_calls() {
        let mut resp = Response::new(&RespLimits::default());
        resp.body("part one, ");
        resp.body("part two");

        assert!(text(&mut resp).ends_with("part one, part two"));
    }

    #[test]
    fn reset_discards_oversized_buffers() {
        let limits = RespLimits {
            default_capacity: 16,
            max_capacity: 64,
            ..RespLimits::default()
        };

        let mut resp = Response::new(&limits);
        resp.body(vec![b'x'; 1024]);
        resp.close();

        resp.reset(&limits);
        assert!(resp.keep_alive);
        assert!(resp.body.capacity() <= 64);
        assert_eq!(text(&mut resp), "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
    }
}
