//! HTTP server protocol implementation
//!
use std::fmt;
use std::net::SocketAddr;

use enums::Status;

mod config;
mod error;
mod head;
mod proto;
mod request;
mod request_target;
mod response;
mod serializer;
mod simple_error_page;

pub use self::error::Error;
pub use self::proto::Proto;
pub use self::request::Request;
pub use self::request_target::RequestTarget;
pub use self::response::Response;
pub use self::serializer::HeaderError;
pub use self::simple_error_page::simple_error_page;


/// Fine-grained configuration of the HTTP server
#[derive(Clone)]
pub struct Config {
    max_header_size: usize,
    input_buffer_limit: usize,
    output_buffer_limit: usize,
    keep_alive: bool,
    server_name: Option<String>,
    error_page: fn(Status) -> Response,
}

/// Information about the connection that is passed to requests
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionInfo {
    pub peer_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    /// Connection is encrypted, so `https` is used for request urls
    pub secure: bool,
}

impl ConnectionInfo {
    pub fn new(peer_addr: SocketAddr, local_addr: SocketAddr)
        -> ConnectionInfo
    {
        ConnectionInfo {
            peer_addr: Some(peer_addr),
            local_addr: Some(local_addr),
            secure: false,
        }
    }
    pub fn secure(mut self, value: bool) -> ConnectionInfo {
        self.secure = value;
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_header_size", &self.max_header_size)
            .field("input_buffer_limit", &self.input_buffer_limit)
            .field("output_buffer_limit", &self.output_buffer_limit)
            .field("keep_alive", &self.keep_alive)
            .field("server_name", &self.server_name)
            .finish()
    }
}
