use std::sync::Arc;

use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;

/// What a middleware invocation produced.
///
/// `Continue` carries the link to invoke on the next wake-up. This is how
/// streamed responses work: one call emits one batch of chunks and hands back
/// a successor, and the connection re-enters through that successor rather
/// than through the chain head, so finished links are never re-run.
pub enum Flow {
    Done,
    Continue(Arc<dyn Middleware>),
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Done => f.write_str("Done"),
            Flow::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

impl Flow {
    pub fn is_done(&self) -> bool {
        matches!(self, Flow::Done)
    }
}

/// One link in the request-processing chain.
///
/// A middleware inspects the request, mutates the response in place, and
/// either finishes or requests a continuation. Raising an [`HttpError`] turns
/// the whole exchange into an error response; it never tears down the
/// connection.
pub trait Middleware: Send + Sync {
    fn call(&self, req: &Request, resp: &mut Response) -> Result<Flow, HttpError>;
}

/// Plain functions and closures work as middleware directly.
impl<F> Middleware for F
where
    F: Fn(&Request, &mut Response) -> Result<Flow, HttpError> + Send + Sync,
{
    fn call(&self, req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
        (self)(req, resp)
    }
}

/// Sequential composition of middleware links.
///
/// Links run in registration order. The first link to raise stops the chain;
/// the first link to request a continuation suspends it — streaming hands the
/// exchange over to that link's successors, so a streaming link should be the
/// last one in the chain.
pub struct Chain {
    links: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    pub fn link(mut self, mw: impl Middleware + 'static) -> Self {
        self.links.push(Arc::new(mw));
        self
    }

    pub fn link_shared(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.links.push(mw);
        self
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Chain {
    fn call(&self, req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
        for link in &self.links {
            match link.call(req, resp)? {
                Flow::Done => continue,
                cont @ Flow::Continue(_) => return Ok(cont),
            }
        }
        Ok(Flow::Done)
    }
}
