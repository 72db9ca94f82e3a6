//! Request router: registration, handler pipelines, and resolution

use crate::{
    http::{request::Request, response::Response},
    router::trie::Trie,
    Method,
};
use std::{fmt, sync::Arc};

/// Transient view over one request/response pair, handed to every callable
/// of a pipeline in turn. Lives only for one pipeline invocation.
pub struct Context<'a> {
    pub request: &'a Request,
    pub response: &'a mut Response,
}

impl Context<'_> {
    /// Route parameter captured during resolution (e.g. `:id`).
    #[inline(always)]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// Query string value (e.g. `?page=2`).
    #[inline(always)]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query(name)
    }
}

/// Type-erased handler callable.
pub type HandlerFn = Arc<dyn Fn(&mut Context<'_>) + Send + Sync>;

/// An ordered, non-empty list of callables bound at one registration call.
///
/// Every registration call mints one `Handler` with the next id from a
/// counter scoped to its [`Router`], so ids are deterministic per router
/// and tests stay hermetic. Identity, equality and ordering follow the id,
/// never the callables.
#[derive(Clone)]
pub struct Handler {
    funcs: Vec<HandlerFn>,
    id: u64,
}

impl Handler {
    /// Registration order id within the owning router.
    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Extends the callable list in place. The id does not change: the
    /// appended callables run under this handler's registration slot.
    pub fn append<T: HandlerSet<T2>, T2>(&mut self, funcs: T) {
        self.funcs.extend(funcs.into_handler_fns());
    }

    /// Invokes every callable in registration order.
    pub fn invoke(&self, ctx: &mut Context<'_>) {
        for func in &self.funcs {
            func(ctx);
        }
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Handler {}

impl PartialOrd for Handler {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Handler {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.id)
    }
}

#[doc(hidden)]
pub struct OneCallable;
#[doc(hidden)]
pub struct ManyCallables;

/// Conversion from what registration accepts into handler callables:
/// a single closure, or a tuple of up to five closures that run in order.
///
/// The `T` parameter is an inference marker only; call sites never name it.
pub trait HandlerSet<T> {
    fn into_handler_fns(self) -> Vec<HandlerFn>;
}

impl<F> HandlerSet<OneCallable> for F
where
    F: Fn(&mut Context<'_>) + Send + Sync + 'static,
{
    fn into_handler_fns(self) -> Vec<HandlerFn> {
        vec![Arc::new(self)]
    }
}

macro_rules! impl_handler_set {
    ($($f:ident),+) => {
        impl<$($f),+> HandlerSet<ManyCallables> for ($($f,)+)
        where
            $($f: Fn(&mut Context<'_>) + Send + Sync + 'static,)+
        {
            #[allow(non_snake_case)]
            fn into_handler_fns(self) -> Vec<HandlerFn> {
                let ($($f,)+) = self;
                vec![$(Arc::new($f) as HandlerFn),+]
            }
        }
    };
}

impl_handler_set!(F1, F2);
impl_handler_set!(F1, F2, F3);
impl_handler_set!(F1, F2, F3, F4);
impl_handler_set!(F1, F2, F3, F4, F5);

/// Prefix-tree request router.
///
/// One trie per method, indexed by the method enum. Terminal handlers are
/// registered with [`handle`](Router::handle) (or the `get`/`post`/`put`
/// wrappers); path-prefix middleware with [`use_at`](Router::use_at).
/// Resolution produces the root-to-leaf [`Pipeline`] for an exact path
/// match, or an empty one.
///
/// Registration needs `&mut self` and the server takes the router by value,
/// so the table is structurally frozen before any concurrent resolution
/// starts.
///
/// # Examples
/// ```
/// use trellis_web::{Context, Method, Router, StatusCode};
///
/// let mut router = Router::new();
///
/// router.use_at("/api", |ctx: &mut Context| {
///     ctx.response.header("x-api-version", "1");
/// });
/// router.get("/api/users/:id", |ctx: &mut Context| {
///     let id = ctx.param("id").unwrap_or("?").to_owned();
///     ctx.response.status(StatusCode::Ok).body(id);
/// });
///
/// let pipeline = router.resolve(Method::Get, "/api/users/42");
/// assert_eq!(pipeline.len(), 2); // middleware, then the terminal handler
/// ```
pub struct Router {
    tables: [Trie<Handler>; Method::COUNT],
    next_id: u64,
}

impl Router {
    pub fn new() -> Self {
        Self {
            tables: std::array::from_fn(|_| Trie::new()),
            next_id: 0,
        }
    }

    /// Registers `callables` as the terminal handler for `method` at the
    /// exact path `path`. Re-registering the same method and path replaces
    /// the previous handler.
    pub fn handle<T: HandlerSet<T2>, T2>(&mut self, method: Method, path: &str, callables: T) {
        let handler = self.mint(callables.into_handler_fns());
        self.tables[method.index()].insert(path, handler);
    }

    /// [`handle`](Router::handle) for [`Method::Get`].
    #[inline]
    pub fn get<T: HandlerSet<T2>, T2>(&mut self, path: &str, callables: T) {
        self.handle(Method::Get, path, callables);
    }

    /// [`handle`](Router::handle) for [`Method::Post`].
    #[inline]
    pub fn post<T: HandlerSet<T2>, T2>(&mut self, path: &str, callables: T) {
        self.handle(Method::Post, path, callables);
    }

    /// [`handle`](Router::handle) for [`Method::Put`].
    #[inline]
    pub fn put<T: HandlerSet<T2>, T2>(&mut self, path: &str, callables: T) {
        self.handle(Method::Put, path, callables);
    }

    /// Registers path-prefix middleware at `path` for every method.
    ///
    /// The callables run before any deeper handler whose path passes through
    /// `path`, in registration order relative to other middleware on the
    /// same route. One id is minted for the whole registration, shared by
    /// all method tables.
    ///
    /// Named `use_at` because `use` is reserved in Rust.
    pub fn use_at<T: HandlerSet<T2>, T2>(&mut self, path: &str, callables: T) {
        let handler = self.mint(callables.into_handler_fns());
        for method in Method::ALL {
            self.tables[method.index()].insert(path, handler.clone());
        }
    }

    fn mint(&mut self, funcs: Vec<HandlerFn>) -> Handler {
        let handler = Handler {
            funcs,
            id: self.next_id,
        };
        self.next_id += 1;
        handler
    }

    /// Resolves `path` in the table for `method`.
    ///
    /// Returns the ordered pipeline for an exact match (root-to-leaf:
    /// shallower middleware first, terminal handler last) or an empty
    /// pipeline when no exact match exists.
    pub fn resolve(&self, method: Method, path: &str) -> Pipeline {
        let mut params = Vec::new();
        self.resolve_with_params(method, path, &mut params)
    }

    /// Like [`resolve`](Router::resolve), also appending captured route
    /// parameters to `params` on a successful match.
    pub fn resolve_with_params(
        &self,
        method: Method,
        path: &str,
        params: &mut Vec<(String, String)>,
    ) -> Pipeline {
        let handlers = self.tables[method.index()]
            .resolve(path, params)
            .into_iter()
            .cloned()
            .collect();

        Pipeline { handlers }
    }

    /// Resolves a parsed request and fills its `params` and `queries` maps.
    ///
    /// A request without a method (never accepted by the parser, but
    /// representable) resolves to the empty pipeline.
    pub fn resolve_request(&self, request: &mut Request) -> Pipeline {
        let Some(method) = request.method() else {
            return Pipeline {
                handlers: Vec::new(),
            };
        };

        let mut params = Vec::new();
        let path = request.uri().path().to_owned();
        let pipeline = self.resolve_with_params(method, &path, &mut params);

        for (name, value) in params {
            request.params.insert(name, value);
        }
        let query = request.uri().query().to_owned();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) => request.queries.insert(key.to_owned(), value.to_owned()),
                None => request.queries.insert(pair.to_owned(), String::new()),
            };
        }

        pipeline
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// The ordered handler chain one resolution produced.
#[derive(Debug, Clone)]
pub struct Pipeline {
    handlers: Vec<Handler>,
}

impl Pipeline {
    /// True when resolution found no exact match; the caller decides what
    /// that means (the server layer answers 404).
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.iter()
    }

    /// Runs every handler in order against `ctx`.
    pub fn run(&self, ctx: &mut Context<'_>) {
        for handler in &self.handlers {
            handler.invoke(ctx);
        }
    }
}
