use crate::{
    errors::ErrorKind,
    http::{
        request::{ParseStatus, Request, RequestParser},
        response::Response,
        types::{StatusCode, Version},
    },
    limits::{ConnLimits, RespLimits},
    router::router::{Context, Router},
    server::server_impl::AllLimits,
};
use std::{io, sync::Arc, time::Instant};
use tokio::{io::AsyncReadExt, net::TcpStream, time::timeout};

pub(crate) struct HttpConnection {
    router: Arc<Router>,

    connection: Connection,
    parser: RequestParser,
    request: Request,
    pub(crate) response: Response,
    // bytes read past the head of the previous request (pipelining)
    carry: Vec<u8>,

    conn_limits: ConnLimits,
    resp_limits: RespLimits,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(router: Arc<Router>, limits: &AllLimits) -> Self {
        Self {
            router,

            connection: Connection::new(),
            parser: RequestParser::new(&limits.2),
            request: Request::new(),
            response: Response::new(&limits.3),
            carry: Vec::new(),

            conn_limits: limits.1.clone(),
            resp_limits: limits.3.clone(),
        }
    }

    #[inline]
    fn reset_request_response(&mut self) {
        self.parser.reset();
        self.request.reset();
        self.response.reset(&self.resp_limits);
    }
}

impl HttpConnection {
    #[inline]
    pub(crate) async fn run(&mut self, stream: &mut TcpStream) -> Result<(), io::Error> {
        let result = self.impl_run(stream).await;
        self.carry.clear();

        match result {
            Ok(()) => Ok(()),
            Err(ErrorKind::Io(e)) => Err(e.0),
            Err(err) => {
                tracing::debug!(error = %err, "request rejected");
                let version = self.request.version().unwrap_or(Version::Http11);
                writer::send_error(stream, version, err).await
            }
        }
    }

    #[inline(always)]
    async fn impl_run(&mut self, stream: &mut TcpStream) -> Result<(), ErrorKind> {
        self.connection.reset();

        while !self.is_expired() {
            self.reset_request_response();

            if !self.read_head(stream).await? {
                break;
            }

            // accepted by the parser's fixed table, but this stack only
            // speaks 1.x on the wire
            if self.request.version() == Some(Version::Http20) {
                return Err(ErrorKind::UnsupportedVersion);
            }

            self.prepare_response();
            self.dispatch();

            writer::write_bytes(stream, self.response.payload()).await?;

            self.connection.request_count += 1;
            if !self.response.keep_alive {
                break;
            }
        }

        Ok(())
    }

    // Feeds bytes to the parser one at a time until the head is accepted.
    // Returns false on a clean close (EOF before the first byte of a head).
    async fn read_head(&mut self, stream: &mut TcpStream) -> Result<bool, ErrorKind> {
        let mut pending = std::mem::take(&mut self.carry);
        let mut offset = 0;
        let mut started = false;
        let mut buf = [0u8; 1024];

        loop {
            while offset < pending.len() {
                let byte = pending[offset];
                offset += 1;
                started = true;

                if self.parser.consume(&mut self.request, byte)? == ParseStatus::Accept {
                    self.carry.extend_from_slice(&pending[offset..]);
                    return Ok(true);
                }
            }

            pending.clear();
            offset = 0;

            let read = stream.read(&mut buf);
            let count = timeout(self.conn_limits.socket_read_timeout, read)
                .await
                .map_err(io::Error::from)??;

            if count == 0 {
                return match started {
                    true => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                    false => Ok(false),
                };
            }
            pending.extend_from_slice(&buf[..count]);
        }
    }

    // Version and keep-alive carry over from the request before handlers run,
    // so handlers see the defaults and may still call close().
    #[inline]
    fn prepare_response(&mut self) {
        let version = self.request.version().unwrap_or(Version::Http11);
        self.response.version = version;

        let connection = self.request.header_str("connection");
        self.response.keep_alive = match version {
            Version::Http11 => !matches!(connection, Some(v) if v.eq_ignore_ascii_case("close")),
            Version::Http10 => {
                matches!(connection, Some(v) if v.eq_ignore_ascii_case("keep-alive"))
            }
            _ => false,
        };
    }

    #[inline]
    fn dispatch(&mut self) {
        let pipeline = self.router.resolve_request(&mut self.request);

        if pipeline.is_empty() {
            self.response.status(StatusCode::NotFound);
            return;
        }

        let mut ctx = Context {
            request: &self.request,
            response: &mut self.response,
        };
        pipeline.run(&mut ctx);
    }

    #[inline(always)]
    fn is_expired(&self) -> bool {
        self.connection.request_count >= self.conn_limits.max_requests_per_connection
            || self.connection.created.elapsed() > self.conn_limits.connection_lifetime
    }
}

pub(crate) mod writer {
    use crate::{errors::ErrorKind, http::types::Version};
    use std::{
        io,
        sync::atomic::{AtomicBool, AtomicU64, Ordering},
    };
    use tokio::{
        io::AsyncWriteExt,
        net::TcpStream,
        time::{timeout, Duration},
    };

    pub(crate) static SOCKET_WRITE_TIMEOUT: AtomicU64 = AtomicU64::new(0);
    pub(crate) static JSON_ERRORS: AtomicBool = AtomicBool::new(true);

    #[inline(always)]
    pub(crate) async fn send_error(
        stream: &mut TcpStream,
        version: Version,
        error: ErrorKind,
    ) -> Result<(), io::Error> {
        write_bytes(
            stream,
            error.as_http(version, JSON_ERRORS.load(Ordering::Relaxed)),
        )
        .await
    }

    #[inline(always)]
    pub(crate) async fn write_bytes(
        stream: &mut TcpStream,
        response: &[u8],
    ) -> Result<(), io::Error> {
        let num = SOCKET_WRITE_TIMEOUT.load(Ordering::Relaxed);
        timeout(Duration::from_micros(num), stream.write_all(response)).await?
    }
}

#[derive(Debug)]
pub(crate) struct Connection {
    created: Instant,
    request_count: usize,
}

impl Connection {
    #[inline(always)]
    pub(crate) fn new() -> Self {
        Self {
            created: Instant::now(),
            request_count: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn reset(&mut self) {
        self.created = Instant::now();
        self.request_count = 0;
    }
}
