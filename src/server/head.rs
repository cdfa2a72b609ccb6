//! Request line and headers parser
use std::str::from_utf8;

use httparse;
use url::Host;

use enums::{Method, Version};
use headers::{self, Headers};
use server::{Error, RequestTarget};


/// Number of headers to allocate on a stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;


/// How the request body is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Fixed(u64),
    Chunked,
}

/// Parsed request head
///
/// Framing headers are validated already, so `body` is authoritative.
#[derive(Debug)]
pub struct Head {
    pub method: Method,
    pub target: RequestTarget,
    pub version: Version,
    pub headers: Headers,
    pub host: Option<String>,
    pub body: BodyKind,
    pub connection_close: bool,
    pub expect_continue: bool,
    pub upgrade: bool,
}

struct Raw {
    method: String,
    path: String,
    version: u8,
    headers: Vec<(String, Vec<u8>)>,
}

fn parse_into<'a>(buf: &'a [u8], headers: &mut [httparse::Header<'a>])
    -> Result<Option<(Raw, usize)>, httparse::Error>
{
    let mut raw = httparse::Request::new(headers);
    match raw.parse(buf)? {
        httparse::Status::Complete(bytes) => {
            let head = Raw {
                method: raw.method.unwrap_or("").to_string(),
                path: raw.path.unwrap_or("").to_string(),
                version: raw.version.unwrap_or(0),
                headers: raw.headers.iter()
                    .map(|h| (h.name.to_string(), h.value.to_vec()))
                    .collect(),
            };
            Ok(Some((head, bytes)))
        }
        httparse::Status::Partial => Ok(None),
    }
}

/// Returns the last token of the request line if the line is complete
fn version_token(buf: &[u8]) -> Option<&[u8]> {
    let start = buf.iter().position(|&x| x != b'\r' && x != b'\n')?;
    let buf = &buf[start..];
    let end = buf.iter().position(|&x| x == b'\n')?;
    let mut line = &buf[..end];
    if line.ends_with(b"\r") {
        line = &line[..line.len()-1];
    }
    line.split(|&x| x == b' ').filter(|x| x.len() > 0).last()
}

fn is_http_version(token: &[u8]) -> bool {
    token.len() == 8 && &token[..5] == b"HTTP/" &&
        token[5].is_ascii_digit() && token[6] == b'.' &&
        token[7].is_ascii_digit()
}

/// Checks that value looks like `host[:port]`
fn valid_host(value: &str) -> bool {
    let (name, port) = match value.rfind(':') {
        Some(idx) if !value[idx..].contains(']') => {
            (&value[..idx], &value[idx+1..])
        }
        _ => (value, ""),
    };
    if !port.bytes().all(|x| x.is_ascii_digit()) ||
        port.len() > 0 && port.parse::<u16>().is_err()
    {
        return false;
    }
    name.len() > 0 && Host::parse(name).is_ok()
}

fn content_length(value: &[u8]) -> Result<u64, Error> {
    let s = from_utf8(value)
        .map_err(|_| Error::BadRequest("invalid content-length"))?
        .trim();
    if s.len() == 0 || !s.bytes().all(|x| x.is_ascii_digit()) {
        return Err(Error::BadRequest("invalid content-length"));
    }
    s.parse().map_err(|_| Error::BadRequest("invalid content-length"))
}

fn scan_headers(raw: Raw) -> Result<Head, Error> {
    // Implements the body length algorithm for requests:
    // http://httpwg.github.io/specs/rfc7230.html#message.body.length
    //
    // 1. If the request contains `Transfer-Encoding` header with `chunked`
    //    as the last encoding the request is chunked. Other final
    //    encodings are not supported.
    // 2. If the request contains a valid `Content-Length` header
    //    the request has the given length in octets.
    // 3. If neither is present the request has an empty body.
    //
    // Both headers at once is a bad request, as it's a known way to
    // smuggle requests through proxies.
    let version = match Version::from_httparse(raw.version) {
        Some(v) => v,
        None => return Err(Error::VersionNotSupported),
    };
    let method = Method::from(&raw.method[..]);
    let target = RequestTarget::parse(&raw.path)
        .ok_or(Error::BadRequest("invalid request target"))?;
    let mut content_length_value = None;
    let mut transfer_encoding = false;
    let mut chunked_last = false;
    let mut close = false;
    let mut expect_continue = false;
    let mut upgrade = false;
    let mut connection_upgrade = false;
    let mut host = None;
    let mut hdrs = Headers::new();
    for (name, value) in raw.headers {
        if name.eq_ignore_ascii_case("Transfer-Encoding") {
            transfer_encoding = true;
            let last = value.split(|&x| x == b',')
                .filter(|x| x.iter().any(|&c| c != b' ' && c != b'\t'))
                .last();
            chunked_last = last.map(headers::is_chunked).unwrap_or(false);
        } else if name.eq_ignore_ascii_case("Content-Length") {
            if content_length_value.is_some() {
                return Err(Error::BadRequest("duplicate content-length"));
            }
            content_length_value = Some(content_length(&value)?);
        } else if name.eq_ignore_ascii_case("Connection") {
            for token in value.split(|&x| x == b',') {
                if headers::is_close(token) {
                    close = true;
                } else if headers::is_upgrade(token) {
                    connection_upgrade = true;
                }
            }
        } else if name.eq_ignore_ascii_case("Host") {
            if host.is_some() {
                return Err(Error::BadRequest("duplicate host header"));
            }
            let value = from_utf8(&value)
                .map_err(|_| Error::BadRequest("invalid host header"))?
                .trim();
            if !valid_host(value) {
                return Err(Error::BadRequest("invalid host header"));
            }
            host = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Expect") {
            if headers::is_continue(&value) {
                expect_continue = true;
            }
        } else if name.eq_ignore_ascii_case("Upgrade") {
            upgrade = true;
        }
        hdrs.add(name, String::from_utf8_lossy(&value).into_owned());
    }
    if transfer_encoding && content_length_value.is_some() {
        return Err(Error::BadRequest(
            "both content-length and transfer-encoding"));
    }
    if transfer_encoding && !chunked_last {
        return Err(Error::NotImplemented("transfer coding"));
    }
    if version == Version::Http11 && host.is_none() {
        return Err(Error::BadRequest("missing host header"));
    }
    if method == Method::Connect {
        if !target.is_authority() {
            return Err(Error::BadRequest(
                "CONNECT requires authority-form target"));
        }
    } else if target.is_authority() {
        return Err(Error::BadRequest(
            "authority-form target is only allowed for CONNECT"));
    } else if target.is_asterisk() && method != Method::Options {
        return Err(Error::BadRequest(
            "asterisk-form target is only allowed for OPTIONS"));
    }
    let body = if transfer_encoding {
        BodyKind::Chunked
    } else {
        BodyKind::Fixed(content_length_value.unwrap_or(0))
    };
    Ok(Head {
        method: method,
        target: target,
        version: version,
        headers: hdrs,
        host: host,
        body: body,
        connection_close: close,
        expect_continue: expect_continue,
        // `Upgrade` must be listed in `Connection` and is ignored in 1.0
        upgrade: upgrade && connection_upgrade && version == Version::Http11,
    })
}

/// Parse request head out of the buffer
///
/// Returns the head and the number of bytes it occupies, or `None` if
/// more bytes are needed. The head must fit into `max_size` bytes.
pub fn parse(buf: &[u8], max_size: usize)
    -> Result<Option<(Head, usize)>, Error>
{
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut result = parse_into(buf, &mut headers);
    if matches!(result, Err(httparse::Error::TooManyHeaders)) {
        let mut vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        result = parse_into(buf, &mut vec);
    }
    match result {
        Ok(Some((_, bytes))) if bytes > max_size => {
            Err(Error::HeadersTooLarge)
        }
        Ok(Some((raw, bytes))) => Ok(Some((scan_headers(raw)?, bytes))),
        Ok(None) if buf.len() > max_size => Err(Error::HeadersTooLarge),
        Ok(None) => Ok(None),
        Err(httparse::Error::Version) => {
            match version_token(buf) {
                Some(token) if is_http_version(token) => {
                    Err(Error::VersionNotSupported)
                }
                Some(_) => Err(Error::BadRequest("invalid version")),
                None if buf.len() > max_size => Err(Error::HeadersTooLarge),
                None => Ok(None),
            }
        }
        Err(httparse::Error::TooManyHeaders) => Err(Error::HeadersTooLarge),
        Err(_) => Err(Error::BadRequest("malformed request head")),
    }
}

#[cfg(test)]
mod test {
    use enums::{Method, Version};
    use server::{Error, RequestTarget};
    use super::{parse, BodyKind, valid_host};

    fn head(data: &str) -> Result<super::Head, Error> {
        parse(data.as_bytes(), 4096).map(|x| x.expect("complete head").0)
    }

    #[test]
    fn simple() {
        let (h, bytes) = parse(b"GET /x?y HTTP/1.1\r\nHost: example.com\r\n\
                                 X-A: 1\r\nx-a: 2\r\n\r\nBODY", 4096)
            .unwrap().unwrap();
        assert_eq!(bytes, 56);
        assert_eq!(h.method, Method::Get);
        assert_eq!(h.version, Version::Http11);
        assert_eq!(h.target, RequestTarget::Origin("/x?y".into()));
        assert_eq!(h.host.as_ref().map(|x| &x[..]), Some("example.com"));
        assert_eq!(h.headers.get_all("X-A"), &["1", "2"]);
        assert_eq!(h.body, BodyKind::Fixed(0));
    }

    #[test]
    fn partial() {
        assert_matches!(parse(b"GET / HTTP/1.1\r\nHost: x\r\n", 4096),
                        Ok(None));
    }

    #[test]
    fn too_large() {
        let mut data = b"GET / HTTP/1.1\r\nX-Long: ".to_vec();
        data.extend(vec![b'x'; 200]);
        assert_matches!(parse(&data, 100), Err(Error::HeadersTooLarge));
        data.extend(b"\r\nHost: x\r\n\r\n");
        assert_matches!(parse(&data, 100), Err(Error::HeadersTooLarge));
        assert_matches!(parse(&data, 4096), Ok(Some(_)));
    }

    #[test]
    fn many_headers() {
        let mut data = "GET / HTTP/1.1\r\nHost: x\r\n".to_string();
        for i in 0..100 {
            data.push_str(&format!("X-Header-{}: {}\r\n", i, i));
        }
        data.push_str("\r\n");
        let h = head(&data).unwrap();
        assert_eq!(h.headers.len(), 101);
    }

    #[test]
    fn versions() {
        assert_matches!(head("GET / HTTP/2.0\r\nHost: x\r\n\r\n"),
                        Err(Error::VersionNotSupported));
        assert_matches!(head("GET / HTTP/1.2\r\nHost: x\r\n\r\n"),
                        Err(Error::VersionNotSupported));
        assert_matches!(head("GET / HTTX/1.1\r\nHost: x\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(parse(b"GET / HTTP/2", 4096), Ok(None));
        let h = head("GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(h.version, Version::Http10);
        assert!(h.host.is_none());
    }

    #[test]
    fn malformed() {
        assert_matches!(head("GET / HTTP/1.1\r\nNo colon here\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("GET\r\n\r\n"), Err(Error::BadRequest(..)));
    }

    #[test]
    fn framing() {
        assert_eq!(head("POST / HTTP/1.1\r\nHost: x\r\n\
                         Content-Length: 5\r\n\r\n").unwrap().body,
                   BodyKind::Fixed(5));
        assert_eq!(head("POST / HTTP/1.1\r\nHost: x\r\n\
                         Transfer-Encoding: gzip, Chunked\r\n\r\n")
                   .unwrap().body,
                   BodyKind::Chunked);
        assert_matches!(head("POST / HTTP/1.1\r\nHost: x\r\n\
                              Content-Length: 5\r\n\
                              Transfer-Encoding: chunked\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("POST / HTTP/1.1\r\nHost: x\r\n\
                              Content-Length: 5\r\n\
                              Content-Length: 5\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("POST / HTTP/1.1\r\nHost: x\r\n\
                              Content-Length: -5\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("POST / HTTP/1.1\r\nHost: x\r\n\
                              Transfer-Encoding: chunked, gzip\r\n\r\n"),
                        Err(Error::NotImplemented(..)));
    }

    #[test]
    fn host_rules() {
        assert_matches!(head("GET / HTTP/1.1\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("GET / HTTP/1.1\r\nHost: a/b\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert!(valid_host("example.com:8080"));
        assert!(valid_host("[::1]:8080"));
        assert!(valid_host("127.0.0.1"));
        assert!(!valid_host("example.com:http"));
        assert!(!valid_host(""));
    }

    #[test]
    fn target_forms() {
        assert!(head("CONNECT example.com:443 HTTP/1.1\r\n\
                      Host: example.com:443\r\n\r\n").is_ok());
        assert_matches!(head("CONNECT / HTTP/1.1\r\nHost: x\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert!(head("OPTIONS * HTTP/1.1\r\nHost: x\r\n\r\n").is_ok());
        assert_matches!(head("GET * HTTP/1.1\r\nHost: x\r\n\r\n"),
                        Err(Error::BadRequest(..)));
        assert_matches!(head("GET example.com:80 HTTP/1.1\r\nHost: x\r\n\r\n"),
                        Err(Error::BadRequest(..)));
    }

    #[test]
    fn flags() {
        let h = head("POST / HTTP/1.1\r\nHost: x\r\n\
                      Connection: Close, Upgrade\r\n\
                      Expect: 100-continue\r\nUpgrade: websocket\r\n\
                      Content-Length: 1\r\n\r\n").unwrap();
        assert!(h.connection_close);
        assert!(h.expect_continue);
        assert!(h.upgrade);
    }

    #[test]
    fn upgrade_needs_connection_token() {
        let h = head("GET / HTTP/1.1\r\nHost: x\r\n\
                      Upgrade: websocket\r\n\r\n").unwrap();
        assert!(!h.upgrade);
        let h = head("GET / HTTP/1.0\r\n\
                      Connection: upgrade\r\nUpgrade: websocket\r\n\r\n")
            .unwrap();
        assert!(!h.upgrade);
        let h = head("GET / HTTP/1.1\r\nHost: x\r\n\
                      Connection: keep-alive, upgrade\r\n\
                      Upgrade: websocket\r\n\r\n").unwrap();
        assert!(h.upgrade);
        assert!(!h.connection_close);
    }
}
