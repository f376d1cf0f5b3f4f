#![forbid(unsafe_code)]

mod body;
mod client;
mod connector;
mod error;
mod estimate;
mod timings;
mod types;
mod util;

pub use client::{HttpClient, HttpClientConfig};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use timings::RequestTimings;
pub use types::{HttpRequest, HttpResponse};
pub use util::proto_str;
