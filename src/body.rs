//! Request and response bodies
//!
//! A body is either fully buffered, a stream of chunks, or (for responses
//! only) a tunnel that takes over the connection after the response head.
//!
//! Streaming bodies produced by the server are the receiving end of a
//! channel. The feeding side (`BodySender`) is owned by the connection
//! engine for request bodies, and by the application for response bodies.
//! Pausing a stream makes `BodySender::wants_data` return false, which in
//! turn makes the connection stop reading from the socket.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

use futures::{Future, Stream, Async, Poll};
use futures::task::{self, Task};

use server::Error;


/// Number of bytes buffered in a body channel after which
/// `BodySender::wants_data` returns false
pub const HIGH_WATER_MARK: usize = 65536;


enum Terminal {
    Open,
    Ended,
    Failed(Option<Error>),
    Closed,
}

struct Channel {
    chunks: VecDeque<Vec<u8>>,
    buffered: usize,
    terminal: Terminal,
    paused: bool,
    reader: Option<Task>,
    feeder: Option<Task>,
}

enum Source {
    Channel(Rc<RefCell<Channel>>),
    Boxed {
        stream: Option<Box<Stream<Item=Vec<u8>, Error=Error>>>,
        paused: bool,
        reader: Option<Task>,
    },
}

/// A stream of body chunks
///
/// Closing or dropping the stream tells the producer (see
/// `BodySender::poll_cancel`) that nobody is interested in the data
/// anymore.
pub struct BodyStream {
    length: Option<u64>,
    source: Source,
}

/// Feeding side of the `BodyStream::channel`
pub struct BodySender {
    chan: Rc<RefCell<Channel>>,
}

/// Connection side of the tunnel, put it into the response body
pub struct Tunnel {
    input: BodySender,
    output: BodyStream,
}

/// Application side of the tunnel
pub struct TunnelPeer {
    input: BodyStream,
    output: BodySender,
}

/// Message body
pub enum Body {
    /// Whole body is in memory
    Buffered(Vec<u8>),
    /// Body is read or written incrementally
    Streaming(BodyStream),
    /// Raw bytes of the connection after the response head,
    /// only valid for `101 Switching Protocols` and `CONNECT` responses
    Tunnel(Tunnel),
}

/// A future that collects the whole body into memory
///
/// Created by `Body::buffer`
pub struct Collect {
    limit: usize,
    state: CollectState,
}

enum CollectState {
    Done(Option<Result<Vec<u8>, Error>>),
    Reading(BodyStream, Vec<u8>),
}

impl Channel {
    fn new() -> Channel {
        Channel {
            chunks: VecDeque::new(),
            buffered: 0,
            terminal: Terminal::Open,
            paused: false,
            reader: None,
            feeder: None,
        }
    }
    fn is_open(&self) -> bool {
        matches!(self.terminal, Terminal::Open)
    }
    fn wake_reader(&mut self) {
        if let Some(task) = self.reader.take() {
            task.notify();
        }
    }
    fn wake_feeder(&mut self) {
        if let Some(task) = self.feeder.take() {
            task.notify();
        }
    }
}

impl BodyStream {
    /// Create a channel with the stream as the receiving end
    ///
    /// `length` is the declared length of the body if known.
    pub fn channel(length: Option<u64>) -> (BodySender, BodyStream) {
        let chan = Rc::new(RefCell::new(Channel::new()));
        let sender = BodySender { chan: chan.clone() };
        let stream = BodyStream {
            length: length,
            source: Source::Channel(chan),
        };
        (sender, stream)
    }
    /// Wrap arbitrary stream of chunks
    pub fn from_stream<S>(length: Option<u64>, stream: S) -> BodyStream
        where S: Stream<Item=Vec<u8>, Error=Error> + 'static
    {
        BodyStream {
            length: length,
            source: Source::Boxed {
                stream: Some(Box::new(stream)),
                paused: false,
                reader: None,
            },
        }
    }
    /// Declared length of the body, `None` if unknown
    pub fn length(&self) -> Option<u64> {
        self.length
    }
    /// Stop emitting chunks until `resume()` is called
    pub fn pause(&mut self) {
        match self.source {
            Source::Channel(ref chan) => chan.borrow_mut().paused = true,
            Source::Boxed { ref mut paused, .. } => *paused = true,
        }
    }
    pub fn resume(&mut self) {
        match self.source {
            Source::Channel(ref chan) => {
                let mut guard = chan.borrow_mut();
                let chan = &mut *guard;
                chan.paused = false;
                chan.wake_reader();
                chan.wake_feeder();
            }
            Source::Boxed { ref mut paused, ref mut reader, .. } => {
                *paused = false;
                if let Some(task) = reader.take() {
                    task.notify();
                }
            }
        }
    }
    pub fn is_paused(&self) -> bool {
        match self.source {
            Source::Channel(ref chan) => chan.borrow().paused,
            Source::Boxed { paused, .. } => paused,
        }
    }
    /// Discard buffered data and notify the producer
    ///
    /// The stream yields no more chunks after close.
    pub fn close(&mut self) {
        match self.source {
            Source::Channel(ref chan) => {
                let mut guard = chan.borrow_mut();
                let chan = &mut *guard;
                chan.chunks.clear();
                chan.buffered = 0;
                if chan.is_open() {
                    chan.terminal = Terminal::Closed;
                }
                chan.wake_feeder();
            }
            Source::Boxed { ref mut stream, .. } => {
                *stream = None;
            }
        }
    }
}

impl Stream for BodyStream {
    type Item = Vec<u8>;
    type Error = Error;
    fn poll(&mut self) -> Poll<Option<Vec<u8>>, Error> {
        match self.source {
            Source::Channel(ref chan) => {
                let mut guard = chan.borrow_mut();
                let chan = &mut *guard;
                // failures are delivered even to a paused consumer
                if chan.paused && !matches!(chan.terminal, Terminal::Failed(_))
                {
                    chan.reader = Some(task::current());
                    return Ok(Async::NotReady);
                }
                if let Some(chunk) = chan.chunks.pop_front() {
                    chan.buffered -= chunk.len();
                    chan.wake_feeder();
                    return Ok(Async::Ready(Some(chunk)));
                }
                match chan.terminal {
                    Terminal::Open => {
                        chan.reader = Some(task::current());
                        Ok(Async::NotReady)
                    }
                    Terminal::Ended | Terminal::Closed => {
                        Ok(Async::Ready(None))
                    }
                    Terminal::Failed(ref mut err) => {
                        Err(err.take().unwrap_or(Error::StreamClosed))
                    }
                }
            }
            Source::Boxed { ref mut stream, paused, ref mut reader } => {
                if paused {
                    *reader = Some(task::current());
                    return Ok(Async::NotReady);
                }
                match *stream {
                    Some(ref mut stream) => stream.poll(),
                    None => Ok(Async::Ready(None)),
                }
            }
        }
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl BodySender {
    /// Push a chunk to the stream
    ///
    /// Never blocks: check `wants_data()` to apply backpressure. Fails if
    /// the body has already ended or the consumer closed the stream.
    pub fn send(&mut self, data: Vec<u8>) -> Result<(), Error> {
        let mut guard = self.chan.borrow_mut();
        let chan = &mut *guard;
        if !chan.is_open() {
            return Err(Error::StreamClosed);
        }
        if data.len() > 0 {
            chan.buffered += data.len();
            chan.chunks.push_back(data);
            chan.wake_reader();
        }
        Ok(())
    }
    /// Finish the body, buffered chunks are still delivered
    pub fn end(&mut self) {
        let mut guard = self.chan.borrow_mut();
        let chan = &mut *guard;
        if chan.is_open() {
            chan.terminal = Terminal::Ended;
            chan.wake_reader();
        }
    }
    /// Finish the body with an error, buffered chunks are discarded
    pub fn fail(&mut self, err: Error) {
        let mut guard = self.chan.borrow_mut();
        let chan = &mut *guard;
        if chan.is_open() {
            chan.terminal = Terminal::Failed(Some(err));
            chan.chunks.clear();
            chan.buffered = 0;
            chan.wake_reader();
        }
    }
    /// Returns true if the stream is open, not paused and its buffer
    /// is below `HIGH_WATER_MARK`
    pub fn wants_data(&self) -> bool {
        let chan = self.chan.borrow();
        chan.is_open() && !chan.paused && chan.buffered < HIGH_WATER_MARK
    }
    /// Returns true if the consumer closed or dropped the stream
    pub fn is_closed(&self) -> bool {
        matches!(self.chan.borrow().terminal, Terminal::Closed)
    }
    /// Returns true if `end()` or `fail()` has been called
    pub fn is_finished(&self) -> bool {
        matches!(self.chan.borrow().terminal,
                 Terminal::Ended | Terminal::Failed(_))
    }
    /// Number of bytes sent but not consumed yet
    pub fn buffered(&self) -> usize {
        self.chan.borrow().buffered
    }
    /// Ready when the stream wants more data (or will never want it)
    ///
    /// Must be called from within a task, the task is woken up when the
    /// consumer reads data or resumes the stream.
    pub fn poll_want(&mut self) -> Async<()> {
        let mut guard = self.chan.borrow_mut();
        let chan = &mut *guard;
        if !chan.is_open() ||
            (!chan.paused && chan.buffered < HIGH_WATER_MARK)
        {
            return Async::Ready(());
        }
        chan.feeder = Some(task::current());
        Async::NotReady
    }
    /// Ready when the consumer closed or dropped the stream
    ///
    /// Producers like timers should stop when this resolves.
    pub fn poll_cancel(&mut self) -> Async<()> {
        let mut guard = self.chan.borrow_mut();
        let chan = &mut *guard;
        if matches!(chan.terminal, Terminal::Closed) {
            return Async::Ready(());
        }
        chan.feeder = Some(task::current());
        Async::NotReady
    }
}

impl Drop for BodySender {
    fn drop(&mut self) {
        self.fail(Error::BodyAborted);
    }
}

impl Tunnel {
    /// Create a tunnel, the `TunnelPeer` stays in the application
    pub fn pair() -> (Tunnel, TunnelPeer) {
        let (in_tx, in_rx) = BodyStream::channel(None);
        let (out_tx, out_rx) = BodyStream::channel(None);
        let tunnel = Tunnel { input: in_tx, output: out_rx };
        let peer = TunnelPeer { input: in_rx, output: out_tx };
        (tunnel, peer)
    }
    /// Sender for bytes read from the connection and the stream of bytes
    /// to write into the connection
    pub fn into_parts(self) -> (BodySender, BodyStream) {
        (self.input, self.output)
    }
}

impl TunnelPeer {
    /// Bytes received from the client
    pub fn input(&mut self) -> &mut BodyStream {
        &mut self.input
    }
    /// Bytes to send to the client
    pub fn output(&mut self) -> &mut BodySender {
        &mut self.output
    }
    pub fn into_parts(self) -> (BodyStream, BodySender) {
        (self.input, self.output)
    }
}

impl Body {
    pub fn empty() -> Body {
        Body::Buffered(Vec::new())
    }
    /// Length of the body if known in advance
    pub fn length(&self) -> Option<u64> {
        match *self {
            Body::Buffered(ref data) => Some(data.len() as u64),
            Body::Streaming(ref stream) => stream.length(),
            Body::Tunnel(..) => None,
        }
    }
    pub fn is_tunnel(&self) -> bool {
        matches!(*self, Body::Tunnel(..))
    }
    /// Pause streaming body, does nothing for other kinds of body
    pub fn pause(&mut self) {
        if let Body::Streaming(ref mut stream) = *self {
            stream.pause();
        }
    }
    /// Resume streaming body, does nothing for other kinds of body
    pub fn resume(&mut self) {
        if let Body::Streaming(ref mut stream) = *self {
            stream.resume();
        }
    }
    /// Collect the whole body in memory
    ///
    /// Fails with `Error::BodyTooLarge` if declared length or actual
    /// amount of data exceeds `limit`.
    pub fn buffer(self, limit: usize) -> Collect {
        let state = match self {
            Body::Buffered(data) => {
                if data.len() > limit {
                    CollectState::Done(Some(Err(Error::BodyTooLarge)))
                } else {
                    CollectState::Done(Some(Ok(data)))
                }
            }
            Body::Streaming(mut stream) => {
                match stream.length() {
                    Some(len) if len > limit as u64 => {
                        stream.close();
                        CollectState::Done(Some(Err(Error::BodyTooLarge)))
                    }
                    Some(len) => {
                        CollectState::Reading(stream,
                                              Vec::with_capacity(len as usize))
                    }
                    None => CollectState::Reading(stream, Vec::new()),
                }
            }
            Body::Tunnel(..) => {
                CollectState::Done(Some(Err(Error::InvalidResponse(
                    "tunnel can't be buffered"))))
            }
        };
        Collect { limit: limit, state: state }
    }
}

impl Future for Collect {
    type Item = Vec<u8>;
    type Error = Error;
    fn poll(&mut self) -> Poll<Vec<u8>, Error> {
        match self.state {
            CollectState::Done(ref mut result) => match result.take() {
                Some(Ok(data)) => Ok(Async::Ready(data)),
                Some(Err(e)) => Err(e),
                None => panic!("Collect polled after completion"),
            },
            CollectState::Reading(ref mut stream, ref mut buf) => loop {
                match stream.poll()? {
                    Async::Ready(Some(chunk)) => {
                        if buf.len() + chunk.len() > self.limit {
                            stream.close();
                            return Err(Error::BodyTooLarge);
                        }
                        buf.extend(chunk);
                    }
                    Async::Ready(None) => {
                        return Ok(Async::Ready(mem::replace(buf, Vec::new())));
                    }
                    Async::NotReady => return Ok(Async::NotReady),
                }
            },
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Body {
        Body::Buffered(data)
    }
}

impl<'a> From<&'a [u8]> for Body {
    fn from(data: &'a [u8]) -> Body {
        Body::Buffered(data.to_vec())
    }
}

impl<'a> From<&'a str> for Body {
    fn from(data: &'a str) -> Body {
        Body::Buffered(data.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(data: String) -> Body {
        Body::Buffered(data.into_bytes())
    }
}

impl From<BodyStream> for Body {
    fn from(stream: BodyStream) -> Body {
        Body::Streaming(stream)
    }
}

impl From<Tunnel> for Body {
    fn from(tunnel: Tunnel) -> Body {
        Body::Tunnel(tunnel)
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("length", &self.length)
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl fmt::Debug for BodySender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BodySender")
            .field("buffered", &self.buffered())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Tunnel")
    }
}

impl fmt::Debug for TunnelPeer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("TunnelPeer")
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Body::Buffered(ref data) => {
                write!(f, "Body::Buffered({} bytes)", data.len())
            }
            Body::Streaming(ref stream) => {
                write!(f, "Body::Streaming({:?})", stream)
            }
            Body::Tunnel(..) => f.write_str("Body::Tunnel"),
        }
    }
}

impl fmt::Debug for Collect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Collect")
    }
}
