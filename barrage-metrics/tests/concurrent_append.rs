use barrage_metrics::{MetricKind, Registry};

#[test]
fn concurrent_writers_lose_no_samples() {
    const WRITERS: usize = 16;
    const PER_WRITER: usize = 2_000;

    let reg = Registry::new();
    let m = reg.register("http_req_duration", MetricKind::Trend);

    std::thread::scope(|s| {
        for w in 0..WRITERS {
            let reg = &reg;
            s.spawn(move || {
                // Half the writers share one series, the rest get their own.
                let tag = if w % 2 == 0 { "shared".to_string() } else { format!("w{w}") };
                let tags = reg.resolve_tags(&[("writer", tag.as_str())]);
                for i in 0..PER_WRITER {
                    reg.record(m, tags.clone(), i as f64);
                }
            });
        }
    });

    let agg = reg.query(m).aggregate();
    assert_eq!(agg.count(), (WRITERS * PER_WRITER) as u64);
    assert_eq!(agg.min(), Some(0.0));
    assert_eq!(agg.max(), Some((PER_WRITER - 1) as f64));
}

#[test]
fn handles_share_the_underlying_series() {
    let reg = Registry::new();
    let m = reg.register("iterations", MetricKind::Counter);
    let tags = reg.resolve_tags(&[("scenario", "default")]);

    let a = reg.handle(m, tags.clone()).unwrap_or_else(|| panic!("handle"));
    let b = reg.handle(m, tags).unwrap_or_else(|| panic!("handle"));

    std::thread::scope(|s| {
        s.spawn(|| (0..500).for_each(|_| a.push(1.0)));
        s.spawn(|| (0..500).for_each(|_| b.push(1.0)));
    });

    assert_eq!(a.len(), 1_000);
    assert_eq!(reg.query(m).aggregate().sum(), 1_000.0);
}
