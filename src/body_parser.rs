use tk_bufstream::Buf;

use chunked::{self, ChunkError};


/// Progress of reading a request body out of the connection buffer
#[derive(Debug, Clone)]
pub enum BodyProgress {
    Fixed(u64), // bytes left
    Chunked(chunked::State),
}

impl BodyProgress {
    /// Returns useful number of bytes in buffer and "end" ("done") flag
    pub fn check_buf(&self, buf: &Buf) -> (usize, bool) {
        use self::BodyProgress::*;
        match *self {
            Fixed(x) if x <= buf.len() as u64 => (x as usize, true),
            Fixed(_) => (buf.len(), false),
            Chunked(ref s) => (s.buffered(), s.is_done()),
        }
    }
    pub fn parse(&mut self, buf: &mut Buf) -> Result<(), ChunkError> {
        use self::BodyProgress::*;
        match *self {
            Fixed(_) => {},
            Chunked(ref mut s) => s.parse(buf)?,
        }
        Ok(())
    }
    pub fn consume(&mut self, buf: &mut Buf, n: usize) {
        use self::BodyProgress::*;
        buf.consume(n);
        match *self {
            Fixed(ref mut x) => {
                assert!(*x >= n as u64);
                *x -= n as u64;
            }
            Chunked(ref mut s) => s.consume(n),
        }
    }
}
