use enums::Status;
use headers::Headers;
use body::Body;


/// Response returned by the request handler
///
/// `Content-Length` and `Transfer-Encoding` are computed by the server
/// from the body. The only exception is a `Content-Length` header set for
/// a streaming body of unknown length, it's used as the declared length.
#[derive(Debug)]
pub struct Response {
    status: Status,
    headers: Headers,
    body: Body,
}

impl Response {
    /// Response with an empty body
    pub fn new(status: Status) -> Response {
        Response {
            status: status,
            headers: Headers::new(),
            body: Body::empty(),
        }
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
    pub fn body(&self) -> &Body {
        &self.body
    }
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }
    pub fn set_body<B: Into<Body>>(&mut self, body: B) {
        self.body = body.into();
    }
    /// Append a header value
    pub fn with_header<N, V>(mut self, name: N, value: V) -> Response
        where N: Into<String> + AsRef<str>, V: Into<String>,
    {
        self.headers.add(name, value);
        self
    }
    /// Suppress a header the server adds automatically (`Date`, `Server`)
    pub fn without_header<N>(mut self, name: N) -> Response
        where N: Into<String> + AsRef<str>,
    {
        self.headers.suppress(name);
        self
    }
    pub fn with_body<B: Into<Body>>(mut self, body: B) -> Response {
        self.body = body.into();
        self
    }
    pub fn into_parts(self) -> (Status, Headers, Body) {
        (self.status, self.headers, self.body)
    }
}

#[cfg(test)]
mod test {
    use enums::Status;
    use super::Response;

    #[test]
    fn builder() {
        let resp = Response::new(Status::Ok)
            .with_header("Content-Type", "text/plain")
            .without_header("Date")
            .with_body("hello");
        assert_eq!(resp.status(), Status::Ok);
        assert_eq!(resp.body().length(), Some(5));
        assert!(resp.headers().is_suppressed("date"));
        let (_, headers, _) = resp.into_parts();
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }
}
