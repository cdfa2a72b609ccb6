use std::fmt;
use std::mem;

use futures::{Future, Poll};
use futures::Async::{Ready, NotReady};

use server::{Response, Error};


/// A computation that eventually produces a response
///
/// Unlike plain `Future` it has an explicit cancellation hook. The hook is
/// called when the request is abandoned (the connection is closed, or
/// a middleware gives up on the request), so the implementation can abort
/// pending work like a connection to a backend.
pub trait Deferred {
    fn poll(&mut self) -> Poll<Response, Error>;
    fn cancel(&mut self) {}
}

/// Result of a request handler
///
/// This is either an eager value or a boxed `Deferred` computation. The
/// engine checks the eager case without boxing on the fast path.
///
/// Dropping a reply doesn't cancel it, call `cancel()` instead.
pub struct Reply(Inner);

enum Inner {
    Value(Result<Response, Error>),
    Deferred(Box<Deferred>),
    Cancelled,
    Done,
}

struct FutureReply<F> {
    future: F,
}

struct CancelReply<F, C> {
    future: F,
    on_cancel: Option<C>,
}

struct MapReply<M> {
    inner: Reply,
    map: Option<M>,
}

impl<F> Deferred for FutureReply<F>
    where F: Future<Item=Response, Error=Error>,
{
    fn poll(&mut self) -> Poll<Response, Error> {
        self.future.poll()
    }
}

impl<F, C> Deferred for CancelReply<F, C>
    where F: Future<Item=Response, Error=Error>,
          C: FnOnce(),
{
    fn poll(&mut self) -> Poll<Response, Error> {
        self.future.poll()
    }
    fn cancel(&mut self) {
        if let Some(func) = self.on_cancel.take() {
            func();
        }
    }
}

impl<M> Deferred for MapReply<M>
    where M: FnOnce(Response) -> Response,
{
    fn poll(&mut self) -> Poll<Response, Error> {
        match self.inner.poll()? {
            Ready(response) => {
                let map = self.map.take()
                    .expect("MapReply polled after completion");
                Ok(Ready(map(response)))
            }
            NotReady => Ok(NotReady),
        }
    }
    fn cancel(&mut self) {
        self.inner.cancel();
    }
}

impl Reply {
    /// Eager response
    pub fn ok(response: Response) -> Reply {
        Reply(Inner::Value(Ok(response)))
    }
    /// Eager error
    pub fn err(err: Error) -> Reply {
        Reply(Inner::Value(Err(err)))
    }
    /// Reply from a `Deferred` computation
    pub fn new<D: Deferred + 'static>(deferred: D) -> Reply {
        Reply(Inner::Deferred(Box::new(deferred)))
    }
    /// Reply from a future without cancellation hook
    pub fn from_future<F>(future: F) -> Reply
        where F: Future<Item=Response, Error=Error> + 'static,
    {
        Reply::new(FutureReply { future: future })
    }
    /// Reply from a future, `on_cancel` is called if reply is cancelled
    /// before it's resolved
    pub fn with_cancel<F, C>(future: F, on_cancel: C) -> Reply
        where F: Future<Item=Response, Error=Error> + 'static,
              C: FnOnce() + 'static,
    {
        Reply::new(CancelReply { future: future, on_cancel: Some(on_cancel) })
    }
    /// Transform the response when it's ready, errors pass through
    pub fn map<M>(self, map: M) -> Reply
        where M: FnOnce(Response) -> Response + 'static,
    {
        match self.0 {
            Inner::Value(Ok(response)) => Reply::ok(map(response)),
            inner @ Inner::Deferred(_) => {
                Reply::new(MapReply { inner: Reply(inner), map: Some(map) })
            }
            inner => Reply(inner),
        }
    }
    /// Returns true if the reply is an eager value
    pub fn is_ready(&self) -> bool {
        matches!(self.0, Inner::Value(_) | Inner::Cancelled)
    }
    /// Cancel the pending computation
    ///
    /// Runs the cancellation hook of a deferred reply. After that the reply
    /// resolves to `Error::Cancelled`. Cancelling a reply that was already
    /// resolved does nothing.
    pub fn cancel(&mut self) {
        match mem::replace(&mut self.0, Inner::Done) {
            Inner::Deferred(mut deferred) => {
                deferred.cancel();
                self.0 = Inner::Cancelled;
            }
            Inner::Value(_) | Inner::Cancelled => {
                self.0 = Inner::Cancelled;
            }
            Inner::Done => {}
        }
    }
}

impl Future for Reply {
    type Item = Response;
    type Error = Error;
    fn poll(&mut self) -> Poll<Response, Error> {
        let mut deferred = match mem::replace(&mut self.0, Inner::Done) {
            Inner::Deferred(d) => d,
            Inner::Value(v) => return Ok(Ready(v?)),
            Inner::Cancelled => return Err(Error::Cancelled),
            Inner::Done => panic!("Reply polled after completion"),
        };
        match deferred.poll()? {
            Ready(response) => Ok(Ready(response)),
            NotReady => {
                self.0 = Inner::Deferred(deferred);
                Ok(NotReady)
            }
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Inner::Value(Ok(_)) => f.write_str("Reply::Ok"),
            Inner::Value(Err(ref e)) => write!(f, "Reply::Err({})", e),
            Inner::Deferred(_) => f.write_str("Reply::Deferred"),
            Inner::Cancelled => f.write_str("Reply::Cancelled"),
            Inner::Done => f.write_str("Reply::Done"),
        }
    }
}
