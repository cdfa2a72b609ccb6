//! The connection state machine
//!
//! Requests are processed strictly one at a time: the next request head is
//! parsed only after the previous response is fully written and the
//! previous request body is fully read (or discarded). Pipelined bytes just
//! wait in the input buffer.
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use futures::{Future, Stream, Async, Poll};
use tk_bufstream::{IoBuf, Buf, ReadBuf, WriteBuf, WriteRaw, FutureWriteRaw};
use tokio_io::{AsyncRead, AsyncWrite};

use body::{Body, BodySender, BodyStream, Tunnel};
use body_parser::BodyProgress;
use chunked::{self, ChunkError};
use enums::{Method, Status, Version};
use headers::Headers;
use middleware::Handler;
use reply::Reply;
use server::{Config, ConnectionInfo, Error, Request, Response};
use server::head::{self, BodyKind, Head};
use server::serializer::{self, Framing, ConnectionHeader, MessageHead};


/// Facts about the current request needed to write a response
#[derive(Debug, Clone, Copy)]
struct Exchange {
    version: Version,
    is_head: bool,
    is_connect: bool,
    upgrade: bool,
    close: bool,
}

/// Request body being read out of the connection
struct Input {
    progress: BodyProgress,
    sender: Option<BodySender>,
    finished: bool,
}

/// Response body being written into the connection
struct Output {
    body: Option<BodyStream>,
    framing: Framing,
    written: u64,
    close: bool,
}

enum State {
    Headers,
    InFlight(Exchange, Input, Reply),
    Writing(Input, Output),
    Tunnel(BodySender, BodyStream),
    Closing(Option<Error>),
    Void,
}

enum Progress {
    Yes,
    No,
    Finished(Option<Error>),
}

struct Engine<S> {
    cin: ReadBuf<S>,
    cout: WriteBuf<S>,
    config: Arc<Config>,
    handler: Option<Rc<Handler>>,
    info: ConnectionInfo,
    state: State,
}

enum Phase<S> {
    Serving(Engine<S>),
    /// Waiting for exclusive access to the socket to shut it down
    Locking(FutureWriteRaw<S>, Option<Error>),
    Shutdown(WriteRaw<S>, Option<Error>),
    Done,
}

/// A low-level HTTP/1.x server protocol handler
///
/// This is a future that resolves when the connection is closed. It
/// resolves to an error when the connection was closed because of an error,
/// even if the error was reported to the client with an error page.
pub struct Proto<S> {
    phase: Phase<S>,
}

impl Input {
    fn empty() -> Input {
        Input {
            progress: BodyProgress::Fixed(0),
            sender: None,
            finished: true,
        }
    }
    fn new(progress: BodyProgress, sender: BodySender) -> Input {
        Input {
            progress: progress,
            sender: Some(sender),
            finished: false,
        }
    }
    /// Nobody reads the rest of the body, but bytes must be drained
    fn discard(&mut self) {
        self.sender.take();
    }
    fn fail(&mut self, err: Error) {
        if let Some(mut sender) = self.sender.take() {
            sender.fail(err);
        }
    }
}

impl Output {
    fn write(&mut self, buf: &mut Buf, chunk: &[u8]) -> Result<(), Error> {
        let len = chunk.len() as u64;
        match self.framing {
            Framing::Fixed(n) => {
                if self.written + len > n {
                    return Err(Error::BodyLength);
                }
                buf.extend(chunk);
            }
            Framing::Chunked => chunked::encode_chunk(buf, chunk),
            Framing::UntilClose => buf.extend(chunk),
            Framing::Bodyless | Framing::Tunnel => {}
        }
        self.written += len;
        Ok(())
    }
    fn finish(&mut self, buf: &mut Buf) -> Result<(), Error> {
        match self.framing {
            Framing::Fixed(n) if self.written != n => Err(Error::BodyLength),
            Framing::Chunked => {
                chunked::encode_end(buf);
                Ok(())
            }
            _ => Ok(()),
        }
    }
    fn close(&mut self) {
        if let Some(mut body) = self.body.take() {
            body.close();
        }
    }
}

impl<S> Engine<S> {
    /// Cancels everything in progress
    ///
    /// Pending reply is cancelled, request body consumer gets an error and
    /// response body producer sees the stream closed.
    fn abort(&mut self) {
        match mem::replace(&mut self.state, State::Void) {
            State::InFlight(_, mut input, mut reply) => {
                input.fail(Error::PrematureEof);
                reply.cancel();
            }
            State::Writing(mut input, mut output) => {
                input.fail(Error::PrematureEof);
                output.close();
            }
            State::Tunnel(mut input, mut output) => {
                input.fail(Error::PrematureEof);
                output.close();
            }
            State::Headers | State::Closing(_) | State::Void => {}
        }
    }
}

impl<S: AsyncRead + AsyncWrite> Proto<S> {
    /// Create a new protocol implementation from a connection, a config
    /// and a handler that is called for every request
    pub fn new(conn: S, cfg: &Arc<Config>, handler: Rc<Handler>,
        info: ConnectionInfo)
        -> Proto<S>
    {
        Proto::start(conn, cfg, Some(handler), info)
    }
    /// Create a protocol that responds with 500 to every request
    pub fn without_handler(conn: S, cfg: &Arc<Config>, info: ConnectionInfo)
        -> Proto<S>
    {
        Proto::start(conn, cfg, None, info)
    }
    fn start(conn: S, cfg: &Arc<Config>, handler: Option<Rc<Handler>>,
        info: ConnectionInfo)
        -> Proto<S>
    {
        let (cout, cin) = IoBuf::new(conn).split();
        Proto {
            phase: Phase::Serving(Engine {
                cin: cin,
                cout: cout,
                config: cfg.clone(),
                handler: handler,
                info: info,
                state: State::Headers,
            }),
        }
    }
}

impl<S: AsyncRead + AsyncWrite> Engine<S> {
    fn wants_read(&self) -> bool {
        if self.cin.done() {
            return false;
        }
        if self.cin.in_buf.len() >= self.config.get_input_buffer_limit() {
            return false;
        }
        match self.state {
            State::Closing(_) | State::Void => false,
            _ => true,
        }
    }

    fn read_input(&mut self) -> Result<bool, Error> {
        let mut read = false;
        while self.wants_read() {
            if self.cin.read()? == 0 {
                break;
            }
            read = true;
        }
        Ok(read)
    }

    fn step(&mut self) -> Progress {
        match mem::replace(&mut self.state, State::Void) {
            State::Headers => self.step_headers(),
            State::InFlight(ex, input, reply) => {
                self.step_in_flight(ex, input, reply)
            }
            State::Writing(input, output) => self.step_writing(input, output),
            State::Tunnel(input, output) => self.step_tunnel(input, output),
            State::Closing(err) => self.step_closing(err),
            State::Void => Progress::Finished(None),
        }
    }

    fn step_headers(&mut self) -> Progress {
        if self.cin.in_buf.len() == 0 {
            if self.cin.done() {
                self.state = State::Closing(None);
                return Progress::Yes;
            }
            self.state = State::Headers;
            return Progress::No;
        }
        let max_size = self.config.get_max_header_size();
        let parsed = head::parse(&self.cin.in_buf[..], max_size);
        match parsed {
            Ok(Some((head, bytes))) => {
                self.cin.in_buf.consume(bytes);
                self.start_request(head);
                Progress::Yes
            }
            Ok(None) if self.cin.done() => {
                debug!("connection closed in the middle of request head");
                self.state = State::Closing(None);
                Progress::Yes
            }
            Ok(None) => {
                self.state = State::Headers;
                Progress::No
            }
            Err(e) => {
                debug!("bad request: {}", e);
                self.write_error(&e, Version::Http11, false);
                self.state = State::Closing(Some(e));
                Progress::Yes
            }
        }
    }

    fn start_request(&mut self, head: Head) {
        let ex = Exchange {
            version: head.version,
            is_head: head.method == Method::Head,
            is_connect: head.method == Method::Connect,
            upgrade: head.upgrade,
            close: head.connection_close || head.version == Version::Http10
                || !self.config.keep_alive,
        };
        let expect_continue = head.expect_continue;
        let (body, input) = match head.body {
            BodyKind::Fixed(0) => (Body::empty(), Input::empty()),
            BodyKind::Fixed(n) => {
                let (tx, rx) = BodyStream::channel(Some(n));
                (Body::Streaming(rx),
                 Input::new(BodyProgress::Fixed(n), tx))
            }
            BodyKind::Chunked => {
                let (tx, rx) = BodyStream::channel(None);
                let state = chunked::State::new(
                    self.config.get_max_header_size());
                (Body::Streaming(rx),
                 Input::new(BodyProgress::Chunked(state), tx))
            }
        };
        let request = match Request::from_head(head, body, &self.info) {
            Ok(request) => request,
            Err(e) => {
                debug!("bad request: {}", e);
                self.write_error(&e, ex.version, ex.is_head);
                self.state = State::Closing(Some(e));
                return;
            }
        };
        debug!("{} {} {:?}", request.method(), request.uri(),
               request.version());
        if expect_continue && ex.version == Version::Http11
            && !input.finished
        {
            serializer::write_continue(&mut self.cout.out_buf, ex.version);
        }
        let reply = match self.handler {
            Some(ref handler) => handler.call(request),
            None => Reply::err(Error::NoHandler),
        };
        self.state = State::InFlight(ex, input, reply);
    }

    /// Moves request body bytes from the input buffer into the body stream
    fn feed(&mut self, input: &mut Input) -> Result<bool, ChunkError> {
        if input.finished {
            return Ok(false);
        }
        let buf = &mut self.cin.in_buf;
        let mut progress = false;
        loop {
            if let Err(e) = input.progress.parse(buf) {
                input.fail(Error::Chunked(e.clone()));
                return Err(e);
            }
            let (bytes, done) = input.progress.check_buf(buf);
            if bytes > 0 {
                let discard = input.sender.as_ref()
                    .map(|s| s.is_closed())
                    .unwrap_or(true);
                if discard {
                    input.sender = None;
                    input.progress.consume(buf, bytes);
                } else if let Some(ref mut sender) = input.sender {
                    if sender.poll_want().is_not_ready() {
                        return Ok(progress);
                    }
                    let data = buf[..bytes].to_vec();
                    input.progress.consume(buf, bytes);
                    if sender.send(data).is_err() {
                        trace!("request body closed while sending");
                    }
                }
                progress = true;
                continue;
            }
            if done {
                if let Some(mut sender) = input.sender.take() {
                    sender.end();
                }
                input.finished = true;
                return Ok(true);
            }
            return Ok(progress);
        }
    }

    /// The peer closed the connection before sending the whole body
    ///
    /// Decided by framing only, so a paused body is noticed too.
    fn input_truncated(&self, input: &Input) -> bool {
        self.cin.done() && !input.finished
            && !input.progress.check_buf(&self.cin.in_buf).1
    }

    fn step_in_flight(&mut self, ex: Exchange, mut input: Input,
        mut reply: Reply)
        -> Progress
    {
        let fed = match self.feed(&mut input) {
            Ok(fed) => fed,
            Err(e) => {
                reply.cancel();
                let e = Error::from(e);
                debug!("bad request body: {}", e);
                self.write_error(&e, ex.version, ex.is_head);
                self.state = State::Closing(Some(e));
                return Progress::Yes;
            }
        };
        if self.input_truncated(&input) {
            debug!("connection closed in the middle of request body");
            input.fail(Error::PrematureEof);
            reply.cancel();
            self.state = State::Closing(Some(Error::PrematureEof));
            return Progress::Yes;
        }
        match reply.poll() {
            Ok(Async::Ready(response)) => {
                self.start_response(ex, input, response);
                Progress::Yes
            }
            Ok(Async::NotReady) => {
                self.state = State::InFlight(ex, input, reply);
                if fed { Progress::Yes } else { Progress::No }
            }
            Err(e) => {
                match e.status() {
                    Some(Status::InternalServerError) | None => {
                        error!("request handler failed: {}", e);
                    }
                    Some(_) => debug!("request rejected: {}", e),
                }
                self.write_error(&e, ex.version, ex.is_head);
                self.state = State::Closing(Some(e));
                Progress::Yes
            }
        }
    }

    fn start_response(&mut self, ex: Exchange, input: Input,
        response: Response)
    {
        let (status, headers, body) = response.into_parts();
        let body = match body {
            Body::Tunnel(tunnel) => {
                return self.start_tunnel(ex, status, headers, tunnel);
            }
            body => body,
        };
        if status == Status::SwitchingProtocol {
            let e = Error::InvalidResponse(
                "101 Switching Protocols requires a tunnel body");
            error!("{}", e);
            self.write_error(&e, ex.version, ex.is_head);
            self.state = State::Closing(Some(e));
            return;
        }
        let declared = match body {
            Body::Streaming(ref stream) if stream.length().is_none() => {
                headers.get("Content-Length")
                    .and_then(|v| v.trim().parse::<u64>().ok())
            }
            ref body => body.length(),
        };
        let framing = if !status.has_body() {
            Framing::Bodyless
        } else {
            match declared {
                Some(n) => Framing::Fixed(n),
                None if ex.version == Version::Http11 => Framing::Chunked,
                None => Framing::UntilClose,
            }
        };
        // bytes after a CONNECT that was not tunneled are not a request
        let close = ex.close
            || framing == Framing::UntilClose
            || headers.has_token("Connection", "close")
            || ex.is_connect
            || (self.cin.done() && self.cin.in_buf.len() == 0);
        let head = MessageHead {
            version: ex.version,
            status: status,
            framing: framing,
            connection: if close { ConnectionHeader::Close }
                        else { ConnectionHeader::KeepAlive },
            server_name: self.config.server_name.as_ref().map(|x| &x[..]),
        };
        if let Err(e) = serializer::write_head(&mut self.cout.out_buf,
                                               &head, &headers)
        {
            let e = Error::from(e);
            error!("can't write response: {}", e);
            if let Body::Streaming(mut stream) = body {
                stream.close();
            }
            self.write_error(&e, ex.version, ex.is_head);
            self.state = State::Closing(Some(e));
            return;
        }
        let send_body = status.has_body() && !ex.is_head;
        let stream = match body {
            Body::Buffered(ref data) if send_body => {
                self.cout.out_buf.extend(data);
                None
            }
            Body::Streaming(stream) if send_body => Some(stream),
            Body::Streaming(mut stream) => {
                stream.close();
                None
            }
            _ => None,
        };
        self.state = State::Writing(input, Output {
            body: stream,
            framing: framing,
            written: 0,
            close: close,
        });
    }

    fn start_tunnel(&mut self, ex: Exchange, status: Status,
        headers: Headers, tunnel: Tunnel)
    {
        let upgrade = status == Status::SwitchingProtocol && ex.upgrade
            && headers.contains("Upgrade");
        let connect = ex.is_connect
            && status.code() >= 200 && status.code() < 300;
        if !upgrade && !connect {
            let e = Error::InvalidResponse(
                "tunnel is only allowed for upgrade or CONNECT");
            error!("{}", e);
            self.write_error(&e, ex.version, ex.is_head);
            self.state = State::Closing(Some(e));
            return;
        }
        let head = MessageHead {
            version: ex.version,
            status: status,
            framing: Framing::Tunnel,
            connection: if upgrade { ConnectionHeader::Upgrade }
                        else { ConnectionHeader::KeepAlive },
            server_name: self.config.server_name.as_ref().map(|x| &x[..]),
        };
        if let Err(e) = serializer::write_head(&mut self.cout.out_buf,
                                               &head, &headers)
        {
            let e = Error::from(e);
            error!("can't write response: {}", e);
            self.write_error(&e, ex.version, ex.is_head);
            self.state = State::Closing(Some(e));
            return;
        }
        debug!("switching connection to tunnel mode");
        let (input, output) = tunnel.into_parts();
        self.state = State::Tunnel(input, output);
    }

    fn step_writing(&mut self, mut input: Input, mut output: Output)
        -> Progress
    {
        if output.body.is_none() {
            if output.close {
                input.discard();
                self.state = State::Closing(None);
                return Progress::Yes;
            }
            input.discard();
        }
        let mut progress = match self.feed(&mut input) {
            Ok(fed) => fed,
            Err(e) => {
                debug!("bad request body: {}", e);
                output.close();
                self.state = State::Closing(Some(e.into()));
                return Progress::Yes;
            }
        };
        if self.input_truncated(&input) {
            debug!("connection closed in the middle of request body");
            input.fail(Error::PrematureEof);
            output.close();
            self.state = State::Closing(Some(Error::PrematureEof));
            return Progress::Yes;
        }
        if let Some(mut stream) = output.body.take() {
            let limit = self.config.get_output_buffer_limit();
            loop {
                if self.cout.out_buf.len() >= limit {
                    output.body = Some(stream);
                    break;
                }
                match stream.poll() {
                    Ok(Async::Ready(Some(chunk))) => {
                        progress = true;
                        if let Err(e) = output.write(&mut self.cout.out_buf,
                                                     &chunk)
                        {
                            error!("response body is longer than declared");
                            stream.close();
                            input.discard();
                            self.state = State::Closing(Some(e));
                            return Progress::Yes;
                        }
                    }
                    Ok(Async::Ready(None)) => {
                        progress = true;
                        if let Err(e) = output.finish(&mut self.cout.out_buf) {
                            error!("response body is shorter than declared");
                            input.discard();
                            self.state = State::Closing(Some(e));
                            return Progress::Yes;
                        }
                        break;
                    }
                    Ok(Async::NotReady) => {
                        output.body = Some(stream);
                        break;
                    }
                    Err(e) => {
                        debug!("response body failed: {}", e);
                        input.discard();
                        self.state = State::Closing(Some(e));
                        return Progress::Yes;
                    }
                }
            }
        }
        if output.body.is_none() && input.finished {
            self.state = if output.close {
                State::Closing(None)
            } else {
                State::Headers
            };
            return Progress::Yes;
        }
        self.state = State::Writing(input, output);
        if progress { Progress::Yes } else { Progress::No }
    }

    fn step_tunnel(&mut self, mut input: BodySender, mut output: BodyStream)
        -> Progress
    {
        let mut progress = false;
        let len = self.cin.in_buf.len();
        if len > 0 {
            if input.is_closed() {
                self.cin.in_buf.consume(len);
                progress = true;
            } else if input.poll_want().is_ready() {
                let data = self.cin.in_buf[..].to_vec();
                self.cin.in_buf.consume(len);
                if input.send(data).is_err() {
                    trace!("tunnel input closed while sending");
                }
                progress = true;
            }
        }
        if self.cin.done() && self.cin.in_buf.len() == 0
            && !input.is_finished() && !input.is_closed()
        {
            input.end();
            progress = true;
        }
        let limit = self.config.get_output_buffer_limit();
        while self.cout.out_buf.len() < limit {
            match output.poll() {
                Ok(Async::Ready(Some(chunk))) => {
                    self.cout.out_buf.extend(&chunk);
                    progress = true;
                }
                Ok(Async::Ready(None)) => {
                    debug!("tunnel closed by the application");
                    input.end();
                    self.state = State::Closing(None);
                    return Progress::Yes;
                }
                Ok(Async::NotReady) => break,
                Err(e) => {
                    debug!("tunnel failed: {}", e);
                    self.state = State::Closing(Some(e));
                    return Progress::Yes;
                }
            }
        }
        self.state = State::Tunnel(input, output);
        if progress { Progress::Yes } else { Progress::No }
    }

    fn step_closing(&mut self, err: Option<Error>) -> Progress {
        if self.cout.out_buf.len() > 0 {
            // wait for the poll loop to flush the buffer
            self.state = State::Closing(err);
            return Progress::No;
        }
        Progress::Finished(err)
    }

    /// Writes an error page, connection is always closed afterwards
    fn write_error(&mut self, err: &Error, version: Version, is_head: bool) {
        let status = err.status().unwrap_or(Status::InternalServerError);
        let (status, headers, body) = (self.config.error_page)(status)
            .into_parts();
        let data = match body {
            Body::Buffered(data) => data,
            _ => Vec::new(),
        };
        let head = MessageHead {
            version: version,
            status: status,
            framing: if status.has_body() {
                Framing::Fixed(data.len() as u64)
            } else {
                Framing::Bodyless
            },
            connection: ConnectionHeader::Close,
            server_name: self.config.server_name.as_ref().map(|x| &x[..]),
        };
        match serializer::write_head(&mut self.cout.out_buf, &head, &headers) {
            Ok(()) => {
                if status.has_body() && !is_head {
                    self.cout.out_buf.extend(&data);
                }
            }
            Err(e) => error!("can't write error page: {}", e),
        }
    }

    /// Resolves when the connection is done, all output is flushed
    /// and the socket may be shut down
    fn poll_connection(&mut self) -> Poll<Option<Error>, Error> {
        loop {
            let read = self.read_input()?;
            let progress = self.step();
            let buffered = self.cout.out_buf.len();
            self.cout.flush()?;
            let flushed = self.cout.out_buf.len() < buffered;
            match progress {
                Progress::Finished(result) => return Ok(Async::Ready(result)),
                Progress::Yes => continue,
                Progress::No if read || flushed => continue,
                Progress::No => return Ok(Async::NotReady),
            }
        }
    }
}

fn finish(result: Option<Error>) -> Poll<(), Error> {
    match result {
        None => Ok(Async::Ready(())),
        Some(e) => {
            debug!("connection closed: {}", e);
            Err(e)
        }
    }
}

impl<S: AsyncRead + AsyncWrite> Future for Proto<S> {
    type Item = ();
    type Error = Error;
    fn poll(&mut self) -> Poll<(), Error> {
        loop {
            self.phase = match mem::replace(&mut self.phase, Phase::Done) {
                Phase::Serving(mut engine) => {
                    match engine.poll_connection() {
                        Ok(Async::Ready(result)) => {
                            let Engine { cout, .. } = engine;
                            Phase::Locking(cout.borrow_raw(), result)
                        }
                        Ok(Async::NotReady) => {
                            self.phase = Phase::Serving(engine);
                            return Ok(Async::NotReady);
                        }
                        Err(e) => {
                            engine.abort();
                            return finish(Some(e));
                        }
                    }
                }
                Phase::Locking(mut lock, result) => {
                    match lock.poll() {
                        Ok(Async::Ready(raw)) => Phase::Shutdown(raw, result),
                        Ok(Async::NotReady) => {
                            self.phase = Phase::Locking(lock, result);
                            return Ok(Async::NotReady);
                        }
                        Err(e) => return finish(result.or(Some(e.into()))),
                    }
                }
                Phase::Shutdown(mut raw, result) => {
                    match raw.shutdown() {
                        Ok(Async::Ready(())) => return finish(result),
                        Ok(Async::NotReady) => {
                            self.phase = Phase::Shutdown(raw, result);
                            return Ok(Async::NotReady);
                        }
                        Err(e) => {
                            debug!("error shutting down connection: {}", e);
                            return finish(result.or(Some(e.into())));
                        }
                    }
                }
                Phase::Done => return Ok(Async::Ready(())),
            };
        }
    }
}

impl<S> Drop for Proto<S> {
    fn drop(&mut self) {
        if let Phase::Serving(ref mut engine) = self.phase {
            engine.abort();
        }
    }
}
