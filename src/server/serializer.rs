//! Writes response head into the output buffer
use tk_bufstream::Buf;

use enums::{Status, Version};
use headers::{Headers, invalid_header};


quick_error! {
    #[derive(Debug)]
    pub enum HeaderError {
        InvalidHeaderName {
            description("Header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("Header value contains invalid characters")
        }
    }
}

/// How response body is delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// All 1xx (Informational), 204 (No Content), and 304 (Not Modified)
    /// responses do not include a message body
    Bodyless,
    /// Body with the given length
    Fixed(u64),
    /// Chunked body
    Chunked,
    /// Body is delimited by closing the connection (HTTP/1.0 only)
    UntilClose,
    /// Raw connection bytes follow the head
    Tunnel,
}

/// Value of the `Connection` header written by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHeader {
    KeepAlive,
    Close,
    Upgrade,
}

/// Everything the serializer needs besides handler-provided headers
#[derive(Debug)]
pub struct MessageHead<'a> {
    pub version: Version,
    pub status: Status,
    pub framing: Framing,
    pub connection: ConnectionHeader,
    pub server_name: Option<&'a str>,
}

// These are always computed by the server
fn is_hop_by_hop(name: &str) -> bool {
    name.eq_ignore_ascii_case("Content-Length") ||
    name.eq_ignore_ascii_case("Transfer-Encoding") ||
    name.eq_ignore_ascii_case("Connection")
}

fn write_header(buf: &mut Buf, name: &str, value: &str)
    -> Result<(), HeaderError>
{
    if name.len() == 0 || invalid_header(name.as_bytes()) ||
        name.bytes().any(|x| x == b':' || x == b' ' || x == b'\t')
    {
        return Err(HeaderError::InvalidHeaderName);
    }
    if invalid_header(value.as_bytes()) {
        return Err(HeaderError::InvalidHeaderValue);
    }
    buf.extend(name.as_bytes());
    buf.extend(b": ");
    buf.extend(value.as_bytes());
    buf.extend(b"\r\n");
    Ok(())
}

#[cfg(feature="date_header")]
fn write_date(buf: &mut Buf) {
    use std::time::SystemTime;
    use httpdate::HttpDate;

    let date = HttpDate::from(SystemTime::now()).to_string();
    buf.extend(b"Date: ");
    buf.extend(date.as_bytes());
    buf.extend(b"\r\n");
}

#[cfg(not(feature="date_header"))]
fn write_date(_buf: &mut Buf) {
}

/// Write `100 Continue` interim response
pub fn write_continue(buf: &mut Buf, version: Version) {
    buf.extend(format!("{} 100 Continue\r\n\r\n", version).as_bytes());
}

/// Write status line and headers including the final empty line
///
/// Nothing is left in the buffer when an error is returned.
pub fn write_head(buf: &mut Buf, head: &MessageHead, headers: &Headers)
    -> Result<(), HeaderError>
{
    let start = buf.len();
    let result = write_head_inner(buf, head, headers);
    if result.is_err() {
        buf.remove_range(start..);
    }
    result
}

fn write_head_inner(buf: &mut Buf, head: &MessageHead, headers: &Headers)
    -> Result<(), HeaderError>
{
    buf.extend(format!("{} {}\r\n", head.version, head.status).as_bytes());
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        write_header(buf, name, value)?;
    }
    if !headers.is_present("Date") {
        write_date(buf);
    }
    if let Some(server) = head.server_name {
        if !headers.is_present("Server") {
            write_header(buf, "Server", server)?;
        }
    }
    match head.framing {
        Framing::Fixed(n) => {
            buf.extend(format!("Content-Length: {}\r\n", n).as_bytes());
        }
        Framing::Chunked => {
            buf.extend(b"Transfer-Encoding: chunked\r\n");
        }
        Framing::Bodyless | Framing::UntilClose | Framing::Tunnel => {}
    }
    match head.connection {
        ConnectionHeader::KeepAlive => {}
        ConnectionHeader::Close => buf.extend(b"Connection: close\r\n"),
        ConnectionHeader::Upgrade => buf.extend(b"Connection: upgrade\r\n"),
    }
    buf.extend(b"\r\n");
    Ok(())
}
