//! Ordered request router.
//!
//! Rules are evaluated in registration order and the first match wins. That
//! is deliberately not a radix-tree "most specific wins" lookup: a catch-all
//! registered early shadows everything after it, exactly as written.
//!
//! Route tables form a tree. [`Router::nest`] attaches a child table under a
//! STARTS_WITH prefix; all tables live in one arena and rules point at their
//! children by index, so lookup walks the tree in a loop instead of recursing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// How a rule's pattern is compared with the remaining request path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchMode {
    /// The whole remaining path must match. `{name}` segments bind parameters.
    Exact,
    /// The remaining path must begin with the pattern. The pattern is literal.
    StartsWith,
}

/// Returned by [`Router::lookup`] when no rule matches.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NotFound;

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no route matches")
    }
}

/// The result of a successful [`Router::lookup`].
pub struct Matched {
    pub handler: BoxedHandler,
    pub params: HashMap<String, String>,
    /// Bytes of the path consumed by STARTS_WITH rules on the way down.
    pub consumed: usize,
}

impl fmt::Debug for Matched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matched")
            .field("params", &self.params)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

enum Pattern {
    /// Compiled single-route tree, used for parameter binding.
    Exact(MatchitRouter<()>),
    Prefix(String),
}

enum Target {
    Handler(BoxedHandler),
    Table(usize),
}

struct Rule {
    source: String,
    pattern: Pattern,
    target: Target,
}

#[derive(Default)]
struct Table {
    rules: Vec<Rule>,
}

/// The application router.
///
/// Build it once at startup; it is immutable afterwards and shared between
/// requests behind an `Arc`. Each registration returns `self` so calls chain.
///
/// ```rust
/// use trellis::{handler_fn, MatchMode, Request, Response, Router};
///
/// async fn asset(req: Request) -> Response { Response::text(req.remaining().to_owned()) }
/// async fn user(req: Request) -> Response { Response::text(req.param("id").unwrap_or("?").to_owned()) }
/// async fn home(_req: Request) -> Response { Response::text("home") }
///
/// let app = Router::new()
///     .route("/static",     MatchMode::StartsWith, handler_fn(asset))
///     .route("/users/{id}", MatchMode::Exact,      handler_fn(user))
///     .route("/",           MatchMode::StartsWith, handler_fn(home));
/// ```
pub struct Router {
    tables: Vec<Table>,
}

impl Router {
    pub fn new() -> Self {
        Self { tables: vec![Table::default()] }
    }

    /// Registers a rule at the end of the root table.
    ///
    /// # Panics
    ///
    /// Panics if an EXACT pattern is not a valid route (for example an
    /// unterminated `{`), or if a STARTS_WITH pattern contains a placeholder.
    /// Route tables are built at startup, so this surfaces before any traffic.
    pub fn route(mut self, pattern: &str, mode: MatchMode, handler: impl Handler) -> Self {
        let pattern_kind = compile(pattern, mode);
        self.tables[0].rules.push(Rule {
            source: pattern.to_owned(),
            pattern: pattern_kind,
            target: Target::Handler(Arc::new(handler)),
        });
        self
    }

    /// Attaches `child` as a nested table under the STARTS_WITH `prefix`.
    ///
    /// Once the prefix matches, lookup continues in `child` with the rest of
    /// the path and never comes back to later rules of this table.
    ///
    /// # Panics
    ///
    /// Panics if `prefix` contains a placeholder.
    pub fn nest(mut self, prefix: &str, child: Router) -> Self {
        let offset = self.tables.len();
        let pattern = compile(prefix, MatchMode::StartsWith);
        for mut table in child.tables {
            for rule in &mut table.rules {
                if let Target::Table(index) = &mut rule.target {
                    *index += offset;
                }
            }
            self.tables.push(table);
        }
        self.tables[0].rules.push(Rule {
            source: prefix.to_owned(),
            pattern,
            target: Target::Table(offset),
        });
        self
    }

    /// Resolves `path` to a handler.
    pub fn lookup(&self, path: &str) -> Result<Matched, NotFound> {
        self.lookup_from(path, 0)
    }

    fn lookup_from(&self, path: &str, start: usize) -> Result<Matched, NotFound> {
        let mut table = 0;
        let mut consumed = start;
        let mut params = HashMap::new();

        loop {
            let rest = remaining(path, consumed);
            let (rule, bound) = self.tables[table]
                .rules
                .iter()
                .find_map(|rule| rule.pattern.matches(rest).map(|bound| (rule, bound)))
                .ok_or(NotFound)?;

            debug!(pattern = %rule.source, rest, "route matched");
            if let Pattern::Prefix(prefix) = &rule.pattern {
                // An exhausted path reads as "/", which consumes nothing.
                if path.len() > consumed {
                    consumed += prefix.len();
                }
            }
            params.extend(bound);

            match &rule.target {
                Target::Handler(handler) => {
                    return Ok(Matched { handler: Arc::clone(handler), params, consumed });
                }
                Target::Table(index) => table = *index,
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// A router is a handler: matched requests are forwarded with their bound
/// parameters and remaining path; misses become `404 Not Found`.
impl Handler for Router {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup_from(req.path(), req.consumed()) {
            Ok(Matched { handler, params, consumed }) => {
                req.set_route(consumed, params);
                handler.call(req)
            }
            Err(NotFound) => {
                debug!(path = req.path(), "no route matched");
                Box::pin(async { Ok(Response::status(StatusCode::NOT_FOUND)) })
            }
        }
    }
}

impl Pattern {
    fn matches(&self, rest: &str) -> Option<HashMap<String, String>> {
        match self {
            Self::Exact(tree) => {
                let matched = tree.at(rest).ok()?;
                Some(
                    matched
                        .params
                        .iter()
                        .map(|(k, v)| (k.to_owned(), v.to_owned()))
                        .collect(),
                )
            }
            Self::Prefix(prefix) => rest.starts_with(prefix.as_str()).then(HashMap::new),
        }
    }
}

fn compile(pattern: &str, mode: MatchMode) -> Pattern {
    match mode {
        MatchMode::Exact => {
            let mut tree = MatchitRouter::new();
            tree.insert(pattern, ())
                .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
            Pattern::Exact(tree)
        }
        MatchMode::StartsWith => {
            assert!(
                !pattern.contains('{'),
                "invalid route `{pattern}`: placeholders are only allowed in exact patterns"
            );
            Pattern::Prefix(pattern.to_owned())
        }
    }
}

fn remaining(path: &str, consumed: usize) -> &str {
    match path.get(consumed..) {
        Some(rest) if !rest.is_empty() => rest,
        _ => "/",
    }
}
