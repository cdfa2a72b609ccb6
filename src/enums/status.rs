use std::fmt;

/// Enum with some HTTP Status codes.
///
/// Codes that have no named variant are kept as `Status::Raw(code)` and
/// have an empty reason phrase, so they are sent as `HTTP/1.1 599 \r\n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    //  1xx status codes
    Continue,                       // 100
    SwitchingProtocol,              // 101
    //  2xx status codes
    Ok,                             // 200
    Created,                        // 201
    Accepted,                       // 202
    NonAuthoritativeInformation,    // 203
    NoContent,                      // 204
    ResetContent,                   // 205
    PartialContent,                 // 206
    //  3xx status codes
    MultipleChoices,                // 300
    MovedPermanently,               // 301
    Found,                          // 302
    SeeOther,                       // 303
    NotModified,                    // 304
    UseProxy,                       // 305
    TemporaryRedirect,              // 307
    PermanentRedirect,              // 308
    //  4xx status codes
    BadRequest,                     // 400
    Unauthorized,                   // 401
    PaymentRequired,                // 402
    Forbidden,                      // 403
    NotFound,                       // 404
    MethodNotAllowed,               // 405
    NotAcceptable,                  // 406
    ProxyAuthenticationRequired,    // 407
    RequestTimeout,                 // 408
    Conflict,                       // 409
    Gone,                           // 410
    LengthRequired,                 // 411
    PreconditionFailed,             // 412
    RequestEntityTooLarge,          // 413
    RequestURITooLong,              // 414
    UnsupportedMediaType,           // 415
    RequestRangeNotSatisfiable,     // 416
    ExpectationFailed,              // 417
    UpgradeRequired,                // 426
    TooManyRequests,                // 429
    RequestHeaderFieldsTooLarge,    // 431
    //  5xx status codes
    InternalServerError,            // 500
    NotImplemented,                 // 501
    BadGateway,                     // 502
    ServiceUnavailable,             // 503
    GatewayTimeout,                 // 504
    VersionNotSupported,            // 505
    /// Any other status code
    Raw(u16),
}

const TABLE: &'static [(Status, u16, &'static str)] = &[
    (Status::Continue, 100, "Continue"),
    (Status::SwitchingProtocol, 101, "Switching Protocols"),
    (Status::Ok, 200, "OK"),
    (Status::Created, 201, "Created"),
    (Status::Accepted, 202, "Accepted"),
    (Status::NonAuthoritativeInformation, 203,
        "Non-Authoritative Information"),
    (Status::NoContent, 204, "No Content"),
    (Status::ResetContent, 205, "Reset Content"),
    (Status::PartialContent, 206, "Partial Content"),
    (Status::MultipleChoices, 300, "Multiple Choices"),
    (Status::MovedPermanently, 301, "Moved Permanently"),
    (Status::Found, 302, "Found"),
    (Status::SeeOther, 303, "See Other"),
    (Status::NotModified, 304, "Not Modified"),
    (Status::UseProxy, 305, "Use Proxy"),
    (Status::TemporaryRedirect, 307, "Temporary Redirect"),
    (Status::PermanentRedirect, 308, "Permanent Redirect"),
    (Status::BadRequest, 400, "Bad Request"),
    (Status::Unauthorized, 401, "Unauthorized"),
    (Status::PaymentRequired, 402, "Payment Required"),
    (Status::Forbidden, 403, "Forbidden"),
    (Status::NotFound, 404, "Not Found"),
    (Status::MethodNotAllowed, 405, "Method Not Allowed"),
    (Status::NotAcceptable, 406, "Not Acceptable"),
    (Status::ProxyAuthenticationRequired, 407,
        "Proxy Authentication Required"),
    (Status::RequestTimeout, 408, "Request Timeout"),
    (Status::Conflict, 409, "Conflict"),
    (Status::Gone, 410, "Gone"),
    (Status::LengthRequired, 411, "Length Required"),
    (Status::PreconditionFailed, 412, "Precondition Failed"),
    (Status::RequestEntityTooLarge, 413, "Request Entity Too Large"),
    (Status::RequestURITooLong, 414, "Request-URI Too Long"),
    (Status::UnsupportedMediaType, 415, "Unsupported Media Type"),
    (Status::RequestRangeNotSatisfiable, 416,
        "Request Range Not Satisfiable"),
    (Status::ExpectationFailed, 417, "Expectation Failed"),
    (Status::UpgradeRequired, 426, "Upgrade Required"),
    (Status::TooManyRequests, 429, "Too Many Requests"),
    (Status::RequestHeaderFieldsTooLarge, 431,
        "Request Header Fields Too Large"),
    (Status::InternalServerError, 500, "Internal Server Error"),
    (Status::NotImplemented, 501, "Not Implemented"),
    (Status::BadGateway, 502, "Bad Gateway"),
    (Status::ServiceUnavailable, 503, "Service Unavailable"),
    (Status::GatewayTimeout, 504, "Gateway Timeout"),
    (Status::VersionNotSupported, 505, "HTTP Version Not Supported"),
];

impl Status {
    /// Returns a named status for known codes and `Raw(code)` otherwise
    pub fn from_code(code: u16) -> Status {
        TABLE.iter()
            .find(|&&(_, c, _)| c == code)
            .map(|&(s, _, _)| s)
            .unwrap_or(Status::Raw(code))
    }

    pub fn code(&self) -> u16 {
        match *self {
            Status::Raw(code) => code,
            ref status => TABLE.iter()
                .find(|&&(ref s, _, _)| s == status)
                .map(|&(_, c, _)| c)
                .expect("every named status is in the table"),
        }
    }

    /// Reason phrase, empty for codes we don't know
    pub fn reason(&self) -> &'static str {
        let code = self.code();
        TABLE.iter()
            .find(|&&(_, c, _)| c == code)
            .map(|&(_, _, r)| r)
            .unwrap_or("")
    }

    /// Returns false for statuses that never carry a message body:
    /// 1xx (Informational), 204 (No Content) and 304 (Not Modified)
    pub fn has_body(&self) -> bool {
        let code = self.code();
        !((code >= 100 && code < 200) || code == 204 || code == 304)
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Status {
        Status::from_code(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:03} {}", self.code(), self.reason())
    }
}
