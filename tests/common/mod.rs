#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use futures::{Async, Poll};
use futures::executor::{spawn, Spawn, Notify, NotifyHandle};
use tokio_io::{AsyncRead, AsyncWrite};

use tk_h1::server::{Proto, Config, ConnectionInfo, Error};
use tk_h1::middleware::Handler;


struct Inner {
    input: Vec<u8>,
    eof: bool,
    output: Vec<u8>,
    shutdown: bool,
}

/// In-memory connection, reads fail with `WouldBlock` until there is
/// input or `close_input()` is called
#[derive(Clone)]
pub struct MockConn {
    inner: Rc<RefCell<Inner>>,
}

impl MockConn {
    pub fn new() -> MockConn {
        MockConn {
            inner: Rc::new(RefCell::new(Inner {
                input: Vec::new(),
                eof: false,
                output: Vec::new(),
                shutdown: false,
            })),
        }
    }
    pub fn add_input<D: AsRef<[u8]>>(&self, data: D) {
        self.inner.borrow_mut().input.extend(data.as_ref());
    }
    pub fn close_input(&self) {
        self.inner.borrow_mut().eof = true;
    }
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().output).to_string()
    }
    /// Returns output written since previous call
    pub fn take_output(&self) -> String {
        let data = ::std::mem::replace(
            &mut self.inner.borrow_mut().output, Vec::new());
        String::from_utf8_lossy(&data).to_string()
    }
    pub fn is_shutdown(&self) -> bool {
        self.inner.borrow().shutdown
    }
}

impl Read for MockConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        if inner.input.len() == 0 {
            if inner.eof {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = ::std::cmp::min(buf.len(), inner.input.len());
        buf[..n].copy_from_slice(&inner.input[..n]);
        inner.input.drain(..n);
        Ok(n)
    }
}

impl Write for MockConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().output.extend(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for MockConn {}

impl AsyncWrite for MockConn {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        self.inner.borrow_mut().shutdown = true;
        Ok(Async::Ready(()))
    }
}

struct Noop;

impl Notify for Noop {
    fn notify(&self, _id: usize) {}
}

fn noop() -> NotifyHandle {
    static NOOP: &'static Noop = &Noop;
    NotifyHandle::from(NOOP)
}

/// Connection under test, polled manually
pub struct Connection {
    pub mock: MockConn,
    proto: Spawn<Proto<MockConn>>,
}

impl Connection {
    pub fn new<H: Handler + 'static>(handler: H) -> Connection {
        Connection::with_config(handler, &Config::new().done())
    }
    pub fn with_config<H: Handler + 'static>(handler: H, cfg: &Arc<Config>)
        -> Connection
    {
        let mock = MockConn::new();
        let proto = Proto::new(mock.clone(), cfg, Rc::new(handler),
                               ConnectionInfo::default());
        Connection {
            mock: mock,
            proto: spawn(proto),
        }
    }
    pub fn without_handler() -> Connection {
        let mock = MockConn::new();
        let proto = Proto::without_handler(mock.clone(), &Config::new().done(),
                                           ConnectionInfo::default());
        Connection {
            mock: mock,
            proto: spawn(proto),
        }
    }
    pub fn poll(&mut self) -> Poll<(), Error> {
        self.proto.poll_future_notify(&noop(), 0)
    }
    /// Polls the connection expecting it to wait for more input
    pub fn pending(&mut self) {
        match self.poll() {
            Ok(Async::NotReady) => {}
            Ok(Async::Ready(())) => panic!("connection closed"),
            Err(e) => panic!("connection failed: {}", e),
        }
    }
}
