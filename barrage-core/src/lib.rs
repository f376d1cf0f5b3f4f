pub mod runner;

pub use barrage_http::{
    Error as HttpError, HttpClient, HttpClientConfig, HttpRequest, HttpResponse,
    HttpTransportErrorKind, RequestTimings,
};
pub use barrage_metrics as metrics;
