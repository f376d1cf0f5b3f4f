use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

use crate::MetricKind;
use crate::key::{Interner, KeyId};
use crate::query::Query;
use crate::sample::{Series, SeriesHandle};
use crate::stats::{Aggregate, MetricValue};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct SeriesMap {
    kind: MetricKind,
    series: DashMap<TagSet, Arc<Series>>,
}

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// Per-metric merge of every series, ready for reporting.
#[derive(Debug, Clone)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub values: MetricValue,
}

#[derive(Debug)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, SeriesMap>,
    epoch: Instant,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            interner: Interner::default(),
            defs: RwLock::new(Vec::new()),
            storage: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    /// Registers `name`, or returns the existing id. The kind of the first
    /// registration sticks.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name_id) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(
            id,
            SeriesMap {
                kind,
                series: DashMap::new(),
            },
        );
        id
    }

    pub fn lookup(&self, name: &str) -> Option<MetricId> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .position(|d| d.name == name_id)
            .map(|idx| MetricId(idx as u32))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn name(&self, metric: MetricId) -> Option<String> {
        let name = self.defs.read().get(metric.0 as usize)?.name;
        self.interner.resolve(name).map(|s| s.to_string())
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_str(&self, key: KeyId) -> String {
        self.interner
            .resolve(key)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    pub fn resolve_tags<K: AsRef<str>, V: AsRef<str>>(&self, tags: &[(K, V)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k.as_ref()), self.resolve_key(v.as_ref()))),
        )
    }

    pub fn tags_to_strings(&self, tags: &TagSet) -> Vec<(String, String)> {
        tags.iter()
            .map(|(k, v)| (self.resolve_str(k), self.resolve_str(v)))
            .collect()
    }

    pub fn handle(&self, metric: MetricId, tags: TagSet) -> Option<SeriesHandle> {
        let series_map = self.storage.get(&metric)?;

        if let Some(series) = series_map.series.get(&tags) {
            return Some(SeriesHandle {
                series: series.value().clone(),
                epoch: self.epoch,
            });
        }

        let kind = series_map.kind;
        let series = series_map
            .series
            .entry(tags)
            .or_insert_with(|| Arc::new(Series::new(kind)))
            .value()
            .clone();

        Some(SeriesHandle {
            series,
            epoch: self.epoch,
        })
    }

    /// Appends one sample. Unknown metric ids are ignored.
    pub fn record(&self, metric: MetricId, tags: TagSet, value: f64) {
        if let Some(h) = self.handle(metric, tags) {
            h.push(value);
        }
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &Series)) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for entry in series_map.series.iter() {
            f(entry.key(), entry.value());
        }
    }

    pub fn metrics(&self) -> Vec<MetricId> {
        (0..self.defs.read().len() as u32).map(MetricId).collect()
    }

    /// Merges every series of every metric. Metrics with no samples are kept
    /// so reporting can show them as empty.
    pub fn summarize(&self) -> Vec<MetricSummary> {
        let mut out: Vec<MetricSummary> = self
            .metrics()
            .into_iter()
            .filter_map(|id| {
                let agg: Aggregate = self.query(id).aggregate();
                Some(MetricSummary {
                    name: self.name(id)?,
                    kind: agg.kind(),
                    values: agg.value(),
                })
            })
            .collect();

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_by_name() {
        let reg = Registry::new();
        let a = reg.register("http_reqs", MetricKind::Counter);
        let b = reg.register("http_reqs", MetricKind::Trend);
        assert_eq!(a, b);
        assert_eq!(reg.kind(a), Some(MetricKind::Counter));
        assert_eq!(reg.lookup("http_reqs"), Some(a));
        assert_eq!(reg.lookup("nope"), None);
    }

    #[test]
    fn record_lands_in_tagged_series() {
        let reg = Registry::new();
        let m = reg.register("http_req_duration", MetricKind::Trend);
        let ok = reg.resolve_tags(&[("status", "200")]);
        let err = reg.resolve_tags(&[("status", "500")]);

        reg.record(m, ok.clone(), 10.0);
        reg.record(m, ok, 20.0);
        reg.record(m, err, 90.0);

        let all = reg.query(m).aggregate();
        assert_eq!(all.count(), 3);
        assert_eq!(all.max(), Some(90.0));

        let summaries = reg.summarize();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "http_req_duration");
    }

    #[test]
    fn summarize_keeps_empty_metrics() {
        let reg = Registry::new();
        reg.register("http_req_failed", MetricKind::Rate);
        let s = reg.summarize();
        assert_eq!(
            s[0].values,
            MetricValue::Rate {
                total: 0,
                trues: 0,
                rate: None
            }
        );
    }
}
