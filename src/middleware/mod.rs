//! Request handlers and composable middleware
//!
//! A `Pipeline` is an ordered list of `Middleware` stages plus a default
//! response. Each stage gets the request and a `Next` continuation that
//! runs the rest of the chain. A stage may pass the request through,
//! transform the eventual response (see `Reply::map`), or answer by itself
//! without calling `next` at all.
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new()
//!     .add(LimitConcurrentRequests::new(100))
//!     .add(BufferBody::new(65536))
//!     .default_response(|req: Request| {
//!         Reply::ok(Response::new(Status::Ok).with_body(req.path()))
//!     });
//! let proto = Proto::new(socket, &config, Rc::new(pipeline), info);
//! ```
use std::fmt;
use std::rc::Rc;

use enums::Status;
use reply::Reply;
use server::{Request, Response};

mod buffer;
pub mod limit;

pub use self::buffer::BufferBody;
pub use self::limit::LimitConcurrentRequests;


/// A request handler called by the connection for every request
pub trait Handler {
    fn call(&self, req: Request) -> Reply;
}

/// A pipeline stage
pub trait Middleware {
    /// Handle the request, call `next.run(req)` to pass it further
    fn call(&self, req: Request, next: Next) -> Reply;
}

impl<F> Handler for F
    where F: Fn(Request) -> Reply,
{
    fn call(&self, req: Request) -> Reply {
        (self)(req)
    }
}

impl<F> Middleware for F
    where F: Fn(Request, Next) -> Reply,
{
    fn call(&self, req: Request, next: Next) -> Reply {
        (self)(req, next)
    }
}

#[derive(Clone)]
struct Chain {
    stages: Vec<Rc<Middleware>>,
    default: Rc<Fn(Request) -> Reply>,
}

/// Ordered list of middleware stages composed into a single `Handler`
///
/// Clones share the stages, so one pipeline may serve many connections.
#[derive(Clone)]
pub struct Pipeline {
    chain: Rc<Chain>,
}

/// The rest of the pipeline after the current stage
///
/// This is an owned value, so a stage may keep it until later (for
/// example until a concurrency slot is free).
pub struct Next {
    chain: Rc<Chain>,
    index: usize,
}

fn not_found(_: Request) -> Reply {
    Reply::ok(Response::new(Status::NotFound))
}

impl Pipeline {
    /// Create an empty pipeline that responds with `404 Not Found`
    pub fn new() -> Pipeline {
        Pipeline {
            chain: Rc::new(Chain {
                stages: Vec::new(),
                default: Rc::new(not_found),
            }),
        }
    }
    /// Append a stage to the end of the pipeline
    pub fn add<M: Middleware + 'static>(mut self, stage: M) -> Pipeline {
        Rc::make_mut(&mut self.chain).stages.push(Rc::new(stage));
        self
    }
    /// Set the handler called when every stage passed the request further
    pub fn default_response<F>(mut self, handler: F) -> Pipeline
        where F: Fn(Request) -> Reply + 'static,
    {
        Rc::make_mut(&mut self.chain).default = Rc::new(handler);
        self
    }
    /// Number of stages
    pub fn len(&self) -> usize {
        self.chain.stages.len()
    }
}

impl Handler for Pipeline {
    fn call(&self, req: Request) -> Reply {
        let next = Next {
            chain: self.chain.clone(),
            index: 0,
        };
        next.run(req)
    }
}

impl Next {
    /// Invoke the remainder of the pipeline
    pub fn run(self, req: Request) -> Reply {
        let stage = self.chain.stages.get(self.index).cloned();
        match stage {
            Some(stage) => {
                let next = Next {
                    chain: self.chain,
                    index: self.index + 1,
                };
                stage.call(req, next)
            }
            None => (*self.chain.default)(req),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.chain.stages.len())
            .finish()
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.stages.len() - self.index))
            .finish()
    }
}
