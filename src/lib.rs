//! trellis_web - Incremental HTTP/1.x parsing and prefix-trie routing
//!
//! A server-side HTTP/1.x stack built around two ideas:
//!
//! - **Incremental, byte-at-a-time parsing**: the request and URI parsers
//!   consume exactly one byte per call and carry all progress in their own
//!   state, so a head split across any read boundaries parses identically
//!   to one arriving whole. No buffer is owned by the parsers; bytes land
//!   directly in the [`Request`] being filled.
//! - **Prefix-trie routing with ordered pipelines**: terminal handlers are
//!   registered at exact paths, middleware at path prefixes, and one
//!   resolution produces the whole root-to-leaf handler [`Pipeline`] for a
//!   request (or an empty one, which the server answers with `404`).
//!
//! The parsers and the [`Router`] are usable on their own; the bundled
//! [`Server`] wires them to a tokio listener with a fixed worker pool.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: persistent connections by default
//! - **HTTP/1.0**: `connection: keep-alive` opt-in
//! - **HTTP/0.9**: recognized, answered with raw-body responses
//! - **HTTP/2.0**: recognized on the request line only; answered with `505`
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use trellis_web::{Context, Router, Server, StatusCode};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!
//!     router.use_at("/api", |ctx: &mut Context| {
//!         ctx.response.header("x-api-version", "1");
//!     });
//!     router.get("/api/users/:id", |ctx: &mut Context| {
//!         let id = ctx.param("id").unwrap_or("?").to_owned();
//!         ctx.response.status(StatusCode::Ok).body(id);
//!     });
//!
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .router(router)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//! Using the parser directly:
//! ```
//! use trellis_web::{ParseStatus, Request, RequestParser};
//! use trellis_web::limits::ReqLimits;
//!
//! let mut request = Request::new();
//! let mut parser = RequestParser::new(&ReqLimits::default());
//!
//! // bytes may arrive in chunks of any size, down to one byte
//! for &byte in b"GET /hello HTTP/1.1\r\n\r\n" {
//!     match parser.consume(&mut request, byte).unwrap() {
//!         ParseStatus::InProgress => {}
//!         ParseStatus::Accept => assert_eq!(request.uri().path(), "/hello"),
//!     }
//! }
//! ```

pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
    pub(crate) mod uri;
}
pub(crate) mod router {
    #[allow(clippy::module_inception)]
    pub(crate) mod router;
    pub(crate) mod trie;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::{ErrorKind, IoError},
    http::{
        request::{Header, ParseStatus, Request, RequestParser},
        response::Response,
        types::{Method, StatusCode, Version},
        uri::{percent_decode, percent_encode, Uri, UriParser},
    },
    router::router::{Context, Handler, HandlerFn, HandlerSet, Pipeline, Router},
    server::server_impl::{Server, ServerBuilder},
};
