//! Streaming HTTP/1.x server protocol based on `tokio` tools
//!
//! The [`server::Proto`](server/struct.Proto.html) future owns a single
//! accepted connection and turns its bytes into a sequence of requests,
//! passing each to a [`Handler`](middleware/trait.Handler.html). Handlers
//! are usually a [`Pipeline`](middleware/struct.Pipeline.html) of
//! middleware stages.

extern crate futures;
extern crate url;
extern crate httparse;
extern crate tokio_io;
extern crate tk_bufstream;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;
#[cfg(feature="date_header")] extern crate httpdate;


pub mod server;
pub mod middleware;
pub mod body;
pub mod chunked;
pub mod headers;
mod enums;
mod reply;
mod body_parser;

pub use enums::{Version, Status, Method};
pub use headers::Headers;
pub use body::{Body, BodyStream, BodySender, Tunnel, TunnelPeer};
pub use reply::{Reply, Deferred};
pub use server::{Request, Response, Error};
