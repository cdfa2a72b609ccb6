use std::io;
use std::error::Error as StdError;

use chunked::ChunkError;
use enums::Status;
use server::serializer::HeaderError;


quick_error! {
    /// HTTP server error
    #[derive(Debug)]
    pub enum Error {
        /// Socket IO error
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        /// Request line and headers exceed `Config::max_header_size`
        HeadersTooLarge {
            description("request headers are too large")
        }
        /// Malformed request line or headers
        BadRequest(reason: &'static str) {
            description("bad request")
            display("bad request: {}", reason)
        }
        /// Protocol version other than HTTP/1.0 and HTTP/1.1
        VersionNotSupported {
            description("HTTP version is not supported")
        }
        /// Transfer coding other than chunked
        NotImplemented(reason: &'static str) {
            description("not implemented")
            display("not implemented: {}", reason)
        }
        /// Error parsing chunked request body
        Chunked(err: ChunkError) {
            description("error decoding chunked body")
            display("error decoding chunked body: {}", err)
            from()
        }
        /// Request body is larger than the configured limit
        BodyTooLarge {
            description("request body is too large")
        }
        /// Body length is required but request is chunked
        LengthRequired {
            description("request body length is required")
        }
        /// Connection closed before request body was received completely
        PrematureEof {
            description("connection closed before request body finished")
        }
        /// Body stream was closed by the consumer
        StreamClosed {
            description("body stream is closed")
        }
        /// Body producer was dropped before the body ended
        BodyAborted {
            description("body producer dropped before the end of body")
        }
        /// Streaming response body doesn't match declared length
        BodyLength {
            description("response body length doesn't match Content-Length")
        }
        /// Pending reply was cancelled
        Cancelled {
            description("request handling was cancelled")
        }
        /// No handler registered for the connection
        NoHandler {
            description("no request handler")
        }
        /// Handler returned response that can't be written
        InvalidResponse(reason: &'static str) {
            description("invalid response")
            display("invalid response: {}", reason)
        }
        /// Response header contains invalid characters
        Header(err: HeaderError) {
            description("invalid response header")
            display("invalid response header: {}", err)
            from()
        }
        /// Application error
        Custom(err: Box<StdError>) {
            description("handler error")
            display("handler error: {}", err)
        }
    }
}

impl Error {
    /// Wrap an application error
    pub fn custom<E: Into<Box<StdError>>>(err: E) -> Error {
        Error::Custom(err.into())
    }
    /// Status code of the error page to send for this error
    ///
    /// Returns `None` for errors after which no response can be sent
    pub fn status(&self) -> Option<Status> {
        use self::Error::*;
        match *self {
            HeadersTooLarge => Some(Status::RequestHeaderFieldsTooLarge),
            BadRequest(..) => Some(Status::BadRequest),
            Chunked(..) => Some(Status::BadRequest),
            VersionNotSupported => Some(Status::VersionNotSupported),
            NotImplemented(..) => Some(Status::NotImplemented),
            BodyTooLarge => Some(Status::RequestEntityTooLarge),
            LengthRequired => Some(Status::LengthRequired),
            Cancelled | NoHandler | InvalidResponse(..) | Header(..)
            | Custom(..) | StreamClosed | BodyAborted
            => Some(Status::InternalServerError),
            Io(..) | PrematureEof | BodyLength => None,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use enums::Status;
    use chunked::ChunkError;
    use super::Error;

    #[test]
    fn statuses() {
        assert_eq!(Error::HeadersTooLarge.status(),
                   Some(Status::RequestHeaderFieldsTooLarge));
        assert_eq!(Error::from(ChunkError::InvalidSize).status(),
                   Some(Status::BadRequest));
        assert_eq!(Error::custom("oops").status(),
                   Some(Status::InternalServerError));
        assert_eq!(Error::from(io::Error::new(io::ErrorKind::Other, "x"))
                   .status(), None);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Error::BadRequest("duplicate host")),
                   "bad request: duplicate host");
        assert_eq!(format!("{}", Error::custom("oops")),
                   "handler error: oops");
    }
}
