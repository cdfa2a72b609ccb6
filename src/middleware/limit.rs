//! Concurrency limiting middleware
//!
//! At most `N` requests passed through the same `LimitConcurrentRequests`
//! instance have their downstream reply pending at any time. Other
//! requests wait in a FIFO queue with their bodies paused, so the
//! connection stops reading their data until they are admitted.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

use futures::{Future, Async, Poll};
use futures::task::{self, Task};

use middleware::{Middleware, Next};
use reply::{Reply, Deferred};
use server::{Request, Response, Error};


struct Shared {
    active: usize,
    limit: usize,
    queue: VecDeque<Rc<RefCell<Waiter>>>,
}

enum Admission {
    Waiting(Request, Next),
    Admitted(Reply),
    Taken,
}

struct Waiter {
    admission: Admission,
    task: Option<Task>,
}

enum State {
    Queued(Rc<RefCell<Waiter>>),
    Active(Reply),
    Done,
}

struct Limited {
    shared: Rc<RefCell<Shared>>,
    state: State,
}

/// Middleware that bounds the number of concurrently running requests
#[derive(Clone)]
pub struct LimitConcurrentRequests {
    shared: Rc<RefCell<Shared>>,
}

impl LimitConcurrentRequests {
    /// Create a limiter allowing `limit` requests at once
    ///
    /// # Panics
    ///
    /// When `limit` is zero
    pub fn new(limit: usize) -> LimitConcurrentRequests {
        assert!(limit > 0, "concurrency limit must be positive");
        LimitConcurrentRequests {
            shared: Rc::new(RefCell::new(Shared {
                active: 0,
                limit: limit,
                queue: VecDeque::new(),
            })),
        }
    }
    /// Number of requests whose downstream reply is pending
    pub fn active(&self) -> usize {
        self.shared.borrow().active
    }
    /// Number of requests waiting for a free slot
    pub fn queued(&self) -> usize {
        self.shared.borrow().queue.len()
    }
}

impl Middleware for LimitConcurrentRequests {
    fn call(&self, mut req: Request, next: Next) -> Reply {
        let admitted = {
            let mut shared = self.shared.borrow_mut();
            if shared.active < shared.limit {
                shared.active += 1;
                true
            } else {
                false
            }
        };
        if admitted {
            return Reply::new(Limited {
                shared: self.shared.clone(),
                state: State::Active(next.run(req)),
            });
        }
        req.body_mut().pause();
        let waiter = Rc::new(RefCell::new(Waiter {
            admission: Admission::Waiting(req, next),
            task: None,
        }));
        let mut shared = self.shared.borrow_mut();
        shared.queue.push_back(waiter.clone());
        debug!("request queued, {} active, {} waiting",
               shared.active, shared.queue.len());
        Reply::new(Limited {
            shared: self.shared.clone(),
            state: State::Queued(waiter),
        })
    }
}

/// Frees a slot and starts the oldest queued request if any
fn release(shared: &Rc<RefCell<Shared>>) {
    let waiter = {
        let mut shared = shared.borrow_mut();
        shared.active -= 1;
        if shared.active < shared.limit {
            let waiter = shared.queue.pop_front();
            if waiter.is_some() {
                shared.active += 1;
            }
            waiter
        } else {
            None
        }
    };
    if let Some(waiter) = waiter {
        admit(&waiter);
    }
}

fn admit(waiter: &Rc<RefCell<Waiter>>) {
    let admission = mem::replace(&mut waiter.borrow_mut().admission,
                                 Admission::Taken);
    let reply = match admission {
        Admission::Waiting(mut req, next) => {
            req.body_mut().resume();
            next.run(req)
        }
        other => {
            waiter.borrow_mut().admission = other;
            return;
        }
    };
    let mut waiter = waiter.borrow_mut();
    waiter.admission = Admission::Admitted(reply);
    if let Some(task) = waiter.task.take() {
        task.notify();
    }
}

impl Limited {
    fn settle(&mut self) {
        self.state = State::Done;
        release(&self.shared);
    }
}

impl Deferred for Limited {
    fn poll(&mut self) -> Poll<Response, Error> {
        loop {
            match mem::replace(&mut self.state, State::Done) {
                State::Queued(waiter) => {
                    let admission = {
                        let mut w = waiter.borrow_mut();
                        match mem::replace(&mut w.admission,
                                           Admission::Taken)
                        {
                            Admission::Admitted(reply) => Some(reply),
                            other => {
                                w.admission = other;
                                w.task = Some(task::current());
                                None
                            }
                        }
                    };
                    match admission {
                        Some(reply) => self.state = State::Active(reply),
                        None => {
                            self.state = State::Queued(waiter);
                            return Ok(Async::NotReady);
                        }
                    }
                }
                State::Active(mut reply) => {
                    match reply.poll() {
                        Ok(Async::NotReady) => {
                            self.state = State::Active(reply);
                            return Ok(Async::NotReady);
                        }
                        result => {
                            self.settle();
                            return result;
                        }
                    }
                }
                State::Done => return Err(Error::Cancelled),
            }
        }
    }
    fn cancel(&mut self) {
        match mem::replace(&mut self.state, State::Done) {
            State::Queued(waiter) => {
                let admission = mem::replace(
                    &mut waiter.borrow_mut().admission, Admission::Taken);
                match admission {
                    Admission::Admitted(mut reply) => {
                        reply.cancel();
                        release(&self.shared);
                    }
                    _ => {
                        debug!("queued request cancelled");
                        self.shared.borrow_mut().queue
                            .retain(|w| !Rc::ptr_eq(w, &waiter));
                    }
                }
            }
            State::Active(mut reply) => {
                reply.cancel();
                release(&self.shared);
            }
            State::Done => {}
        }
    }
}

impl Drop for Limited {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for LimitConcurrentRequests {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("LimitConcurrentRequests")
            .field("active", &shared.active)
            .field("limit", &shared.limit)
            .field("queued", &shared.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::{Future, Async};
    use futures::future;
    use futures::executor::{spawn, Notify, NotifyHandle};
    use futures::sync::oneshot;
    use url::Url;

    use body::{Body, BodyStream};
    use enums::{Method, Status};
    use middleware::{Handler, Pipeline};
    use reply::Reply;
    use server::{Request, Response, Error};
    use super::LimitConcurrentRequests;

    struct Noop;

    impl Notify for Noop {
        fn notify(&self, _id: usize) {}
    }

    fn noop() -> NotifyHandle {
        static NOOP: &'static Noop = &Noop;
        NotifyHandle::from(NOOP)
    }

    type Senders = Rc<RefCell<Vec<(String, oneshot::Sender<Response>)>>>;

    /// Handler that records paths and leaves replies pending
    fn pipeline(limit: &LimitConcurrentRequests, started: &Senders)
        -> Pipeline
    {
        let started = started.clone();
        Pipeline::new()
            .add(limit.clone())
            .default_response(move |req: Request| {
                let (tx, rx) = oneshot::channel();
                started.borrow_mut().push((req.path().to_string(), tx));
                Reply::from_future(rx.map_err(|_| Error::Cancelled))
            })
    }

    fn request(path: &str) -> Request {
        Request::new(Method::Get,
            Url::parse(&format!("http://localhost{}", path)).unwrap())
    }

    fn paths(started: &Senders) -> Vec<String> {
        started.borrow().iter().map(|&(ref p, _)| p.clone()).collect()
    }

    fn finish(started: &Senders, path: &str) {
        let pos = started.borrow().iter().position(|&(ref p, _)| p == path)
            .unwrap();
        let (_, tx) = started.borrow_mut().remove(pos);
        tx.send(Response::new(Status::Ok)).unwrap();
    }

    #[test]
    fn bounded_and_fifo() {
        let limit = LimitConcurrentRequests::new(2);
        let started = Rc::new(RefCell::new(Vec::new()));
        let p = pipeline(&limit, &started);
        let mut replies = ["/1", "/2", "/3", "/4"].iter()
            .map(|path| spawn(p.call(request(path))))
            .collect::<Vec<_>>();
        assert_eq!(limit.active(), 2);
        assert_eq!(limit.queued(), 2);
        assert_eq!(paths(&started), vec!["/1", "/2"]);
        for r in &mut replies {
            assert!(r.poll_future_notify(&noop(), 0).unwrap().is_not_ready());
        }

        finish(&started, "/2");
        assert_matches!(replies[1].poll_future_notify(&noop(), 0),
            Ok(Async::Ready(ref r)) if r.status() == Status::Ok);
        assert_eq!(limit.active(), 2);
        assert_eq!(limit.queued(), 1);
        assert_eq!(paths(&started), vec!["/1", "/3"]);

        finish(&started, "/1");
        assert!(replies[0].poll_future_notify(&noop(), 0).unwrap().is_ready());
        assert_eq!(paths(&started), vec!["/3", "/4"]);
        assert_eq!(limit.queued(), 0);

        finish(&started, "/3");
        finish(&started, "/4");
        assert!(replies[2].poll_future_notify(&noop(), 0).unwrap().is_ready());
        assert!(replies[3].poll_future_notify(&noop(), 0).unwrap().is_ready());
        assert_eq!(limit.active(), 0);
    }

    #[test]
    fn errors_free_slot() {
        let limit = LimitConcurrentRequests::new(1);
        let p = Pipeline::new()
            .add(limit.clone())
            .default_response(|_: Request| {
                Reply::err(Error::custom("failed"))
            });
        assert!(p.call(request("/a")).wait().is_err());
        assert!(p.call(request("/b")).wait().is_err());
        assert_eq!(limit.active(), 0);
    }

    #[test]
    fn cancel_queued() {
        let limit = LimitConcurrentRequests::new(1);
        let started = Rc::new(RefCell::new(Vec::new()));
        let p = pipeline(&limit, &started);
        let mut first = spawn(p.call(request("/1")));
        let mut second = p.call(request("/2"));
        let mut third = spawn(p.call(request("/3")));
        assert_eq!(limit.queued(), 2);

        second.cancel();
        assert_eq!(limit.queued(), 1);
        assert_matches!(second.wait(), Err(Error::Cancelled));

        assert!(first.poll_future_notify(&noop(), 0).unwrap().is_not_ready());
        finish(&started, "/1");
        assert!(first.poll_future_notify(&noop(), 0).unwrap().is_ready());
        // the cancelled request never reaches the handler
        assert_eq!(paths(&started), vec!["/3"]);
        assert!(third.poll_future_notify(&noop(), 0).unwrap().is_not_ready());
    }

    #[test]
    fn cancel_active() {
        let limit = LimitConcurrentRequests::new(1);
        let started = Rc::new(RefCell::new(Vec::new()));
        let p = pipeline(&limit, &started);
        let mut first = p.call(request("/1"));
        let _second = p.call(request("/2"));
        assert_eq!(limit.active(), 1);
        assert_eq!(limit.queued(), 1);

        first.cancel();
        assert_eq!(limit.active(), 1);
        assert_eq!(limit.queued(), 0);
        assert_eq!(paths(&started), vec!["/1", "/2"]);
        // downstream of the first request was dropped
        let (_, tx) = started.borrow_mut().remove(0);
        assert!(tx.is_canceled());
    }

    #[test]
    fn queued_body_is_paused() {
        let limit = LimitConcurrentRequests::new(1);
        let bodies = Rc::new(RefCell::new(Vec::new()));
        let b = bodies.clone();
        let p = Pipeline::new()
            .add(limit.clone())
            .default_response(move |mut req: Request| {
                b.borrow_mut().push(req.take_body());
                Reply::from_future(future::empty::<Response, Error>())
            });
        let mut first = p.call(request("/1"));
        let (tx, rx) = BodyStream::channel(None);
        let _second = p.call(request("/2").with_body(Body::Streaming(rx)));
        assert!(!tx.wants_data());
        assert_eq!(bodies.borrow().len(), 1);

        first.cancel();
        assert!(tx.wants_data());
        assert_eq!(bodies.borrow().len(), 2);
    }
}
