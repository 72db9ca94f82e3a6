use crate::{
    errors::ErrorKind,
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    router::router::Router,
    server::connection::{writer, HttpConnection},
    Version,
};
use crossbeam::queue::SegQueue;
use std::{net::SocketAddr, sync::atomic::Ordering, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    task::yield_now,
    time::sleep as tokio_sleep,
};

/// An HTTP server dispatching requests through a [`Router`].
///
/// The server pre-spawns a fixed pool of worker tasks, each owning its own
/// parser, request and response buffers; parsers are never shared between
/// connections. Accepted connections flow through an admission queue the
/// workers poll.
///
/// # Examples
///
/// ```no_run
/// use trellis_web::{Context, Router, Server, StatusCode};
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() {
///     let mut router = Router::new();
///     router.get("/hello", |ctx: &mut Context| {
///         ctx.response.status(StatusCode::Ok).body("Hello world!");
///     });
///
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .router(router)
///         .build()
///         .launch()
///         .await
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    stream_queue: TcpQueue,
    error_queue: TcpQueue,
    server_limits: ServerLimits,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            router: None,

            server_limits: None,
            request_limits: None,
            response_limits: None,
            connection_limits: None,
        }
    }

    /// Starts accepting incoming connections. Never returns.
    #[inline]
    pub async fn launch(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "server listening");
        }

        loop {
            let Ok(value) = self.listener.accept().await else {
                continue;
            };

            match self.stream_queue.len() < self.server_limits.max_pending_connections {
                true => self.stream_queue.push(value),
                false => self.error_queue.push(value),
            }
        }
    }

    #[inline]
    async fn get_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (TcpStream, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}

//

/// Builder for configuring and creating [`Server`] instances.
///
/// [`listener`](Self::listener) and [`router`](Self::router) are required;
/// every limits group falls back to its security-first default.
///
/// Taking the [`Router`] by value is what freezes the routing table: once
/// the server owns it behind an `Arc`, no registration method is reachable
/// while workers resolve concurrently.
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    router: Option<Router>,

    server_limits: Option<ServerLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
    connection_limits: Option<ConnLimits>,
}

impl ServerBuilder {
    /// Sets the TCP listener that the server will use to accept connections.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the router that resolves and runs handler pipelines.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Configures server-level concurrency and queueing limits.
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection timeouts and lifetime limits.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures response buffer limits.
    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Finalizes the builder and constructs a [`Server`] instance.
    ///
    /// Spawns the worker pool immediately, so this must run inside a tokio
    /// runtime.
    ///
    /// # Panics
    ///
    /// Error messages:
    /// - ``The `listener` method must be called to create``
    /// - ``The `router` method must be called to create``
    #[inline]
    #[track_caller]
    pub fn build(self) -> Server {
        let (listener, router, limits) = self.get_all_parts();
        Self::store_atomics(&limits);

        let router = Arc::new(router);
        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());

        for _ in 0..limits.0.max_connections {
            Self::spawn_worker(&stream_queue, &limits, &router);
        }
        if limits.0.count_503_handlers != 0 {
            for _ in 0..limits.0.count_503_handlers {
                Self::spawn_alarmist(&error_queue, &limits);
            }
        } else {
            Self::spawn_quiet_alarmist(&error_queue, &limits);
        }

        Server {
            listener,
            stream_queue,
            error_queue,
            server_limits: limits.0,
        }
    }

    #[inline]
    fn spawn_worker(queue: &TcpQueue, limits: &AllLimits, router: &Arc<Router>) {
        let queue = queue.clone();
        let wait = limits.0.wait_strategy.clone();
        let mut conn = HttpConnection::new(router.clone(), limits);

        tokio::spawn(async move {
            loop {
                let (mut stream, addr) = Server::get_stream(&queue, &wait).await;

                if let Err(error) = conn.run(&mut stream).await {
                    tracing::debug!(%addr, %error, "connection closed with error");
                }
            }
        });
    }

    #[inline]
    fn spawn_alarmist(queue: &TcpQueue, limits: &AllLimits) {
        let queue = queue.clone();
        let wait = limits.0.wait_strategy.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = Server::get_stream(&queue, &wait).await;

                let _ = writer::send_error(
                    &mut stream,
                    Version::Http11,
                    ErrorKind::ServiceUnavailable,
                )
                .await;
            }
        });
    }

    #[inline]
    fn spawn_quiet_alarmist(queue: &TcpQueue, limits: &AllLimits) {
        let queue = queue.clone();
        let wait = limits.0.wait_strategy.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = Server::get_stream(&queue, &wait).await;

                drop(stream);
            }
        });
    }

    #[inline(always)]
    fn store_atomics(limits: &AllLimits) {
        writer::SOCKET_WRITE_TIMEOUT.store(
            limits
                .1
                .socket_write_timeout
                .as_micros()
                .try_into()
                .unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        writer::JSON_ERRORS.store(limits.0.json_errors, Ordering::Relaxed);
    }

    #[inline]
    #[track_caller]
    fn get_all_parts(self) -> (TcpListener, Router, AllLimits) {
        (
            self.listener
                .expect("The `listener` method must be called to create"),
            self.router
                .expect("The `router` method must be called to create"),
            (
                self.server_limits.unwrap_or_default(),
                self.connection_limits.unwrap_or_default(),
                self.request_limits.unwrap_or_default(),
                self.response_limits.unwrap_or_default(),
            ),
        )
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;
pub(crate) type AllLimits = (ServerLimits, ConnLimits, ReqLimits, RespLimits);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, StatusCode};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn spawn_server(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Server::builder().listener(listener).router(router).build();
        tokio::spawn(server.launch());

        addr
    }

    async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        String::from_utf8(raw).unwrap()
    }

    fn test_router() -> Router {
        let mut router = Router::new();
        router.use_at("/api", |ctx: &mut Context| {
            ctx.response.header("x-api", "1");
        });
        router.get("/api/hello", |ctx: &mut Context| {
            ctx.response.status(StatusCode::Ok).body("hello");
        });
        router
    }

    #[tokio::test]
    async fn serves_matched_route() {
        let addr = spawn_server(test_router()).await;

        let reply = roundtrip(
            addr,
            b"GET /api/hello HTTP/1.1\r\nconnection: close\r\n\r\n",
        )
        .await;

        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
        assert!(reply.contains("x-api: 1\r\n"), "{reply}");
        assert!(reply.ends_with("hello"), "{reply}");
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let addr = spawn_server(test_router()).await;

        let reply = roundtrip(
            addr,
            b"GET /api/missing HTTP/1.1\r\nconnection: close\r\n\r\n",
        )
        .await;

        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn parse_reject_maps_to_client_error() {
        let addr = spawn_server(test_router()).await;

        let reply = roundtrip(addr, b"BOGUS /api/hello HTTP/1.1\r\n\r\n").await;

        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{reply}");
        assert!(reply.contains("INVALID_METHOD"), "{reply}");
    }

    #[tokio::test]
    async fn http2_request_answered_with_505() {
        let addr = spawn_server(test_router()).await;

        let reply = roundtrip(addr, b"GET /api/hello HTTP/2.0\r\n\r\n").await;

        assert!(
            reply.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"),
            "{reply}"
        );
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let addr = spawn_server(test_router()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /api/hello HTTP/1.1\r\n\r\n\
                  GET /api/hello HTTP/1.1\r\nconnection: close\r\n\r\n",
            )
            .await
            .unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let reply = String::from_utf8(raw).unwrap();

        assert_eq!(reply.matches("HTTP/1.1 200 OK\r\n").count(), 2, "{reply}");
    }
}
