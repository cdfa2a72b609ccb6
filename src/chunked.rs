//! Chunked transfer-coding
//!
//! The decoder works in place: it strips chunk framing out of the
//! connection input buffer, so that after `State::parse` the first
//! `State::buffered()` bytes of the buffer are decoded body data.
use httparse::parse_chunk_size;
use tk_bufstream::Buf;


/// Maximum length of the chunk size line, including extensions
pub const MAX_CHUNK_HEAD: usize = 128;


quick_error! {
    /// Error decoding chunked body
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ChunkError {
        InvalidSize {
            description("invalid chunk size")
        }
        SizeLineTooLong {
            description("chunk size line is too long")
        }
        ChunkTooLarge {
            description("chunk size does not fit in memory")
        }
        MissingDelimiter {
            description("chunk data is not followed by CRLF")
        }
        TrailersTooLarge {
            description("chunked trailers are too large")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Size,
    Data,
    Delimiter,
    Trailers,
    Done,
}

/// Incremental chunked decoder
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    buffered: usize,
    pending: usize,
    trailers: usize,
    trailer_limit: usize,
    phase: Phase,
}

fn find_newline(data: &[u8]) -> Option<usize> {
    data.iter().position(|&x| x == b'\n')
}

impl State {
    /// Create a decoder, trailers are bounded by `trailer_limit` bytes
    pub fn new(trailer_limit: usize) -> State {
        State {
            buffered: 0,
            pending: 0,
            trailers: 0,
            trailer_limit: trailer_limit,
            phase: Phase::Size,
        }
    }
    pub fn parse(&mut self, buf: &mut Buf) -> Result<(), ChunkError> {
        use self::Phase::*;
        loop {
            match self.phase {
                Size => {
                    let avail = buf.len() - self.buffered;
                    if avail == 0 {
                        return Ok(());
                    }
                    let result = parse_chunk_size(&buf[self.buffered..])
                        .map_err(|_| ChunkError::InvalidSize)?;
                    match result {
                        ::httparse::Status::Complete((bytes, size)) => {
                            if bytes > MAX_CHUNK_HEAD {
                                return Err(ChunkError::SizeLineTooLong);
                            }
                            if size > usize::max_value() as u64 {
                                return Err(ChunkError::ChunkTooLarge);
                            }
                            buf.remove_range(
                                self.buffered..self.buffered+bytes);
                            if size == 0 {
                                self.phase = Trailers;
                            } else {
                                self.pending = size as usize;
                                self.phase = Data;
                            }
                        }
                        ::httparse::Status::Partial => {
                            if avail > MAX_CHUNK_HEAD {
                                return Err(ChunkError::SizeLineTooLong);
                            }
                            return Ok(());
                        }
                    }
                }
                Data => {
                    let avail = buf.len() - self.buffered;
                    if avail >= self.pending {
                        self.buffered += self.pending;
                        self.pending = 0;
                        self.phase = Delimiter;
                    } else {
                        self.buffered += avail;
                        self.pending -= avail;
                        return Ok(());
                    }
                }
                Delimiter => {
                    let avail = buf.len() - self.buffered;
                    if avail == 0 {
                        return Ok(());
                    }
                    if buf[self.buffered] != b'\r' {
                        return Err(ChunkError::MissingDelimiter);
                    }
                    if avail == 1 {
                        return Ok(());
                    }
                    if buf[self.buffered+1] != b'\n' {
                        return Err(ChunkError::MissingDelimiter);
                    }
                    buf.remove_range(self.buffered..self.buffered+2);
                    self.phase = Size;
                }
                Trailers => {
                    let line = find_newline(&buf[self.buffered..]);
                    match line {
                        Some(end) => {
                            let end = self.buffered + end + 1;
                            let empty = &buf[self.buffered..end] == b"\r\n"
                                     || &buf[self.buffered..end] == b"\n";
                            self.trailers += end - self.buffered;
                            if self.trailers > self.trailer_limit {
                                return Err(ChunkError::TrailersTooLarge);
                            }
                            buf.remove_range(self.buffered..end);
                            if empty {
                                self.phase = Done;
                            }
                        }
                        None => {
                            let avail = buf.len() - self.buffered;
                            if self.trailers + avail > self.trailer_limit {
                                return Err(ChunkError::TrailersTooLarge);
                            }
                            return Ok(());
                        }
                    }
                }
                Done => return Ok(()),
            }
        }
    }
    /// Number of decoded body bytes at the start of the buffer
    pub fn buffered(&self) -> usize {
        self.buffered
    }
    /// Returns true when the terminating zero chunk and trailers were read
    ///
    /// Decoded bytes may still be buffered at this point.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
    /// Mark `n` decoded bytes as consumed, the caller removes them
    /// from the buffer
    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}

/// Write a single chunk, empty data produces no output
pub fn encode_chunk(buf: &mut Buf, data: &[u8]) {
    if data.len() == 0 {
        return;
    }
    buf.extend(format!("{:x}\r\n", data.len()).as_bytes());
    buf.extend(data);
    buf.extend(b"\r\n");
}

/// Write the terminating zero-size chunk
pub fn encode_end(buf: &mut Buf) {
    buf.extend(b"0\r\n\r\n");
}
