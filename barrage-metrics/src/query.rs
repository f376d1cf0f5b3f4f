use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::MetricKind;
use crate::key::KeyId;
use crate::registry::{MetricId, Registry};
use crate::stats::Aggregate;
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    Has(KeyId),
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Has(k) => tags.get(k).is_some(),
        }
    }
}

/// Read-side selection over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: &str, value: &str) -> Self {
        let key = self.registry.resolve_key(key);
        let value = self.registry.resolve_key(value);
        self.filters.push(TagFilter::Eq(key, value));
        self
    }

    #[must_use]
    pub fn where_has(mut self, key: &str) -> Self {
        let key = self.registry.resolve_key(key);
        self.filters.push(TagFilter::Has(key));
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    fn kind(&self) -> MetricKind {
        self.registry
            .kind(self.metric)
            .unwrap_or(MetricKind::Counter)
    }

    /// Merges all matching series.
    pub fn aggregate(self) -> Aggregate {
        let mut agg = Aggregate::empty(self.kind());
        self.registry.visit_series(self.metric, |tags, series| {
            if self.matches(tags) {
                agg.extend(series.snapshot());
            }
        });
        agg.finish();
        agg
    }

    /// Merges matching series per value of `key`. Series without `key` are
    /// skipped.
    pub fn aggregate_by(self, key: &str) -> BTreeMap<String, Aggregate> {
        let key = self.registry.resolve_key(key);
        let kind = self.kind();
        let mut groups: BTreeMap<String, Aggregate> = BTreeMap::new();

        self.registry.visit_series(self.metric, |tags, series| {
            if !self.matches(tags) {
                return;
            }
            let Some(value) = tags.get(key) else {
                return;
            };
            groups
                .entry(self.registry.resolve_str(value))
                .or_insert_with(|| Aggregate::empty(kind))
                .extend(series.snapshot());
        });

        for agg in groups.values_mut() {
            agg.finish();
        }
        groups
    }
}
