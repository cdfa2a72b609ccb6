use std::cmp::max;
use std::sync::Arc;

use enums::Status;
use server::{Config, Response};
use server::simple_error_page::simple_error_page;


impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config {
            max_header_size: 4096,
            input_buffer_limit: 65536,
            output_buffer_limit: 65536,
            keep_alive: true,
            server_name: Some(concat!("tk-h1/",
                env!("CARGO_PKG_VERSION")).to_string()),
            error_page: simple_error_page,
        }
    }
    /// Maximum size of the request line and headers (431 when exceeded)
    ///
    /// Also limits the size of trailers of chunked request bodies.
    pub fn max_header_size(&mut self, value: usize) -> &mut Self {
        self.max_header_size = value;
        self
    }
    /// Stop reading from the socket when this many bytes are buffered
    ///
    /// Never less than `max_header_size`.
    pub fn input_buffer_limit(&mut self, value: usize) -> &mut Self {
        self.input_buffer_limit = value;
        self
    }
    /// Stop pulling the response body when this many bytes wait to be sent
    pub fn output_buffer_limit(&mut self, value: usize) -> &mut Self {
        self.output_buffer_limit = value;
        self
    }
    /// Allow processing more than one request per connection
    pub fn keep_alive(&mut self, value: bool) -> &mut Self {
        self.keep_alive = value;
        self
    }
    /// Value of the `Server` header added to responses, `None` disables it
    pub fn server_name<S: Into<String>>(&mut self, value: Option<S>)
        -> &mut Self
    {
        self.server_name = value.map(Into::into);
        self
    }
    /// Function that builds a response for errors detected by the server
    pub fn error_page(&mut self, value: fn(Status) -> Response) -> &mut Self
    {
        self.error_page = value;
        self
    }
    /// Create a Arc'd config clone to pass to the constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    pub(crate) fn get_max_header_size(&self) -> usize {
        self.max_header_size
    }
    pub(crate) fn get_input_buffer_limit(&self) -> usize {
        max(self.input_buffer_limit, self.max_header_size + 1)
    }
    pub(crate) fn get_output_buffer_limit(&self) -> usize {
        self.output_buffer_limit
    }
}

#[cfg(test)]
mod test {
    use enums::Status;
    use server::{Config, Response};

    fn teapot(_: Status) -> Response {
        Response::new(Status::Raw(418))
    }

    #[test]
    fn defaults() {
        let cfg = Config::new();
        assert_eq!(cfg.get_max_header_size(), 4096);
        assert_eq!(cfg.get_input_buffer_limit(), 65536);
        assert!(cfg.keep_alive);
        assert!(cfg.server_name.as_ref().unwrap().starts_with("tk-h1/"));
    }

    #[test]
    fn builder() {
        let cfg = Config::new()
            .max_header_size(100000)
            .input_buffer_limit(1024)
            .server_name(None::<String>)
            .error_page(teapot)
            .done();
        assert_eq!(cfg.get_input_buffer_limit(), 100001);
        assert!(cfg.server_name.is_none());
        assert_eq!((cfg.error_page)(Status::BadRequest).status(),
                   Status::Raw(418));
    }
}
