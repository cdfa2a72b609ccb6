use std::net::SocketAddr;
use std::time::Instant;

use url::Url;

use enums::{Method, Version};
use headers::Headers;
use body::Body;
use server::{Error, RequestTarget, ConnectionInfo};
use server::head::Head;


/// A request passed to the handler
///
/// Everything except the body is immutable. The body is usually a
/// `Body::Streaming` fed by the connection while the handler runs.
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: RequestTarget,
    uri: Url,
    version: Version,
    headers: Headers,
    body: Body,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    secure: bool,
    received: Instant,
}

/// Resolve request target into a full url
///
/// Origin-form and asterisk-form targets are resolved against the `Host`
/// header, for HTTP/1.0 requests without `Host` the local address of the
/// connection is used.
pub fn normalize_uri(target: &RequestTarget, host: Option<&str>,
    info: &ConnectionInfo)
    -> Result<Url, Error>
{
    use self::RequestTarget::*;
    let scheme = if info.secure { "https" } else { "http" };
    let fallback;
    let host = match host {
        Some(host) => host,
        None => {
            fallback = info.local_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| String::from("127.0.0.1"));
            &fallback[..]
        }
    };
    let uri = match *target {
        Origin(ref path) => format!("{}://{}{}", scheme, host, path),
        Asterisk => format!("{}://{}", scheme, host),
        Absolute { ref scheme, ref authority, ref path } => {
            format!("{}://{}{}", scheme, authority, path)
        }
        Authority(ref authority) => format!("{}://{}", scheme, authority),
    };
    Url::parse(&uri).map_err(|_| Error::BadRequest("invalid request target"))
}

impl Request {
    /// Create a request out of a url
    ///
    /// Used to construct requests outside of the server (in tests and
    /// internal redirects), the target is in origin-form.
    pub fn new(method: Method, uri: Url) -> Request {
        let mut path = uri.path().to_string();
        if let Some(query) = uri.query() {
            path.push('?');
            path.push_str(query);
        }
        Request {
            method: method,
            target: RequestTarget::Origin(path),
            secure: uri.scheme() == "https",
            uri: uri,
            version: Version::Http11,
            headers: Headers::new(),
            body: Body::empty(),
            peer_addr: None,
            local_addr: None,
            received: Instant::now(),
        }
    }
    pub(crate) fn from_head(head: Head, body: Body, info: &ConnectionInfo)
        -> Result<Request, Error>
    {
        let uri = normalize_uri(&head.target,
            head.host.as_ref().map(|x| &x[..]), info)?;
        Ok(Request {
            method: head.method,
            target: head.target,
            uri: uri,
            version: head.version,
            headers: head.headers,
            body: body,
            peer_addr: info.peer_addr,
            local_addr: info.local_addr,
            secure: info.secure,
            received: Instant::now(),
        })
    }
    pub fn with_header<N, V>(mut self, name: N, value: V) -> Request
        where N: Into<String> + AsRef<str>, V: Into<String>,
    {
        self.headers.add(name, value);
        self
    }
    pub fn with_body<B: Into<Body>>(mut self, body: B) -> Request {
        self.body = body.into();
        self
    }
    pub fn method(&self) -> &Method {
        &self.method
    }
    /// Request target as it was in the request line
    pub fn target(&self) -> &RequestTarget {
        &self.target
    }
    /// Normalized url of the request
    pub fn uri(&self) -> &Url {
        &self.uri
    }
    pub fn path(&self) -> &str {
        self.uri.path()
    }
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }
    pub fn version(&self) -> Version {
        self.version
    }
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
    pub fn body(&self) -> &Body {
        &self.body
    }
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }
    /// Take the body out, leaving an empty one
    pub fn take_body(&mut self) -> Body {
        ::std::mem::replace(&mut self.body, Body::empty())
    }
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
    /// Returns true if the connection is encrypted
    pub fn is_secure(&self) -> bool {
        self.secure
    }
    /// Time when the request head was parsed
    pub fn received_at(&self) -> Instant {
        self.received
    }
}

#[cfg(test)]
mod test {
    use server::{RequestTarget, ConnectionInfo};
    use super::normalize_uri;

    fn info() -> ConnectionInfo {
        ConnectionInfo::new("10.0.0.1:5000".parse().unwrap(),
                            "10.0.0.2:8080".parse().unwrap())
    }

    #[test]
    fn origin() {
        let url = normalize_uri(&RequestTarget::Origin("/a/b?c=d".into()),
            Some("example.com:81"), &info()).unwrap();
        assert_eq!(url.as_str(), "http://example.com:81/a/b?c=d");
    }

    #[test]
    fn secure_origin() {
        let url = normalize_uri(&RequestTarget::Origin("/".into()),
            Some("example.com"), &info().secure(true)).unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn no_host_uses_local_address() {
        let url = normalize_uri(&RequestTarget::Origin("/x".into()),
            None, &info()).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.2:8080/x");
        let url = normalize_uri(&RequestTarget::Origin("/x".into()),
            None, &ConnectionInfo::default()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1/x");
    }

    #[test]
    fn absolute_and_authority() {
        let url = normalize_uri(&RequestTarget::parse("http://other/y").unwrap(),
            Some("example.com"), &info().secure(true)).unwrap();
        assert_eq!(url.as_str(), "http://other/y");
        let url = normalize_uri(&RequestTarget::Authority("db:5432".into()),
            Some("db:5432"), &info()).unwrap();
        assert_eq!(url.host_str(), Some("db"));
        assert_eq!(url.port(), Some(5432));
    }

    #[test]
    fn asterisk() {
        let url = normalize_uri(&RequestTarget::Asterisk,
            Some("example.com"), &info()).unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }
}
