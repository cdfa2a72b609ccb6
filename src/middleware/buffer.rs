use std::mem;

use futures::{Future, Async, Poll};

use body::{Body, Collect};
use middleware::{Middleware, Next};
use reply::{Reply, Deferred};
use server::{Request, Response, Error};


/// Reads the whole request body into memory before calling the rest of
/// the pipeline
///
/// Bodies larger than the limit are rejected with `413 Payload Too Large`
/// (`Error::BodyTooLarge`), the declared length is checked before reading
/// anything.
#[derive(Debug, Clone)]
pub struct BufferBody {
    limit: usize,
    require_length: bool,
}

enum State {
    Reading(Collect, Request, Next),
    Running(Reply),
    Done,
}

struct Buffering(State);

impl BufferBody {
    pub fn new(limit: usize) -> BufferBody {
        BufferBody {
            limit: limit,
            require_length: false,
        }
    }
    /// Reject bodies of unknown length with `411 Length Required`
    pub fn require_length(mut self, value: bool) -> BufferBody {
        self.require_length = value;
        self
    }
}

impl Middleware for BufferBody {
    fn call(&self, mut req: Request, next: Next) -> Reply {
        let body = req.take_body();
        if let Body::Streaming(ref stream) = body {
            if self.require_length && stream.length().is_none() {
                return Reply::err(Error::LengthRequired);
            }
        }
        match body {
            Body::Buffered(ref data) if data.len() <= self.limit => {}
            body => {
                let collect = body.buffer(self.limit);
                return Reply::new(Buffering(
                    State::Reading(collect, req, next)));
            }
        }
        next.run(req.with_body(body))
    }
}

impl Deferred for Buffering {
    fn poll(&mut self) -> Poll<Response, Error> {
        loop {
            match mem::replace(&mut self.0, State::Done) {
                State::Reading(mut collect, req, next) => {
                    match collect.poll()? {
                        Async::Ready(data) => {
                            trace!("buffered request body of {} bytes",
                                   data.len());
                            self.0 = State::Running(
                                next.run(req.with_body(data)));
                        }
                        Async::NotReady => {
                            self.0 = State::Reading(collect, req, next);
                            return Ok(Async::NotReady);
                        }
                    }
                }
                State::Running(mut reply) => {
                    let result = reply.poll();
                    if let Ok(Async::NotReady) = result {
                        self.0 = State::Running(reply);
                    }
                    return result;
                }
                State::Done => return Err(Error::Cancelled),
            }
        }
    }
    fn cancel(&mut self) {
        if let State::Running(mut reply)
            = mem::replace(&mut self.0, State::Done)
        {
            reply.cancel();
        }
    }
}
