//! Append-only metric sample store.
//!
//! Every sample lands in a series identified by `(metric, tags)`. Series are
//! sharded so concurrent virtual users only contend when they write the same
//! series, and aggregation happens once the writers are done.

pub mod key;
pub mod query;
pub mod registry;
pub mod sample;
pub mod stats;
pub mod tags;

pub use key::KeyId;
pub use query::Query;
pub use registry::{MetricId, MetricSummary, Registry};
pub use sample::{Sample, SeriesHandle};
pub use stats::{Aggregate, MetricValue, TrendSummary, percentile};
pub use tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    /// Monotonic sum of all samples.
    Counter,
    /// Last observed value wins.
    Gauge,
    /// Fraction of non-zero samples.
    Rate,
    /// Distribution summarized by percentiles.
    Trend,
}
