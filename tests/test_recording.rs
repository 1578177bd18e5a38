//! Aggregation results under concurrent recording.

use std::thread;

use backendapi_stats::{
    Aggregation, AggregationData, Measure, Recorder, Registry, TagKey, TagMap, View,
    ViewDefinition,
};

struct Fixture {
    recorder: Recorder,
    measure: Measure<f64>,
    method: TagKey,
    view: View,
}

fn fixture(aggregation: Aggregation) -> Fixture {
    let registry = Registry::new();
    let measure = registry
        .register_measure::<f64>("backendapi/latency", "Request latency", "ms")
        .unwrap();
    let method = registry.register_tag_key("method").unwrap();
    let view = registry
        .register_view(
            ViewDefinition::new("backend/latency", &measure, aggregation).with_tag_keys([&method]),
        )
        .unwrap();
    Fixture {
        recorder: registry.recorder(),
        measure,
        method,
        view,
    }
}

fn count_of(view: &View) -> u64 {
    match view.row(&["FetchMatches"]).map(|row| row.data) {
        None => 0,
        Some(AggregationData::Count(count)) => count,
        Some(other) => panic!("unexpected aggregation data {other:?}"),
    }
}

#[test]
fn test_concurrent_count() {
    const THREADS: u64 = 8;

    for per_thread in [0_u64, 1, 250] {
        let f = fixture(Aggregation::Count);
        let tags = TagMap::new().with(&f.method, "FetchMatches");

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..per_thread {
                        f.recorder.record(&f.measure, 1.5, &tags);
                    }
                });
            }
        });

        assert_eq!(count_of(&f.view), THREADS * per_thread);
    }
}

#[test]
fn test_sum_is_order_independent() {
    let values = [0.5, 2.0, 4.25, 8.0, 16.0, 32.0];
    let forward = fixture(Aggregation::Sum);
    let backward = fixture(Aggregation::Sum);

    for value in values {
        forward.recorder.record(
            &forward.measure,
            value,
            &TagMap::new().with(&forward.method, "FetchMatches"),
        );
    }
    for value in values.iter().rev() {
        backward.recorder.record(
            &backward.measure,
            *value,
            &TagMap::new().with(&backward.method, "FetchMatches"),
        );
    }

    let expected: f64 = values.iter().sum();
    for f in [&forward, &backward] {
        assert_eq!(
            f.view.row(&["FetchMatches"]).unwrap().data,
            AggregationData::Sum(expected)
        );
    }
}

#[test]
fn test_concurrent_sum() {
    let f = fixture(Aggregation::Sum);
    let tags = TagMap::new().with(&f.method, "FetchMatches");

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    f.recorder.record(&f.measure, 0.25, &tags);
                }
            });
        }
    });

    // every partial sum is exactly representable
    assert_eq!(
        f.view.row(&["FetchMatches"]).unwrap().data,
        AggregationData::Sum(100.0)
    );
}

#[test]
fn test_concurrent_last_value_is_one_of_the_records() {
    let f = fixture(Aggregation::LastValue);
    let tags = TagMap::new().with(&f.method, "FetchMatches");
    let values = [10.0, 20.0, 30.0, 40.0];

    thread::scope(|s| {
        for value in values {
            let f = &f;
            let tags = &tags;
            s.spawn(move || f.recorder.record(&f.measure, value, tags));
        }
    });

    match f.view.row(&["FetchMatches"]).unwrap().data {
        AggregationData::LastValue(value) => assert!(values.contains(&value), "got {value}"),
        other => panic!("unexpected aggregation data {other:?}"),
    }
}

#[test]
fn test_distribution_buckets() {
    let f = fixture(Aggregation::distribution([1.0, 5.0, 10.0]).unwrap());
    let tags = TagMap::new().with(&f.method, "FetchMatches");

    for value in [0.5, 1.0, 3.0, 10.0, 11.0] {
        f.recorder.record(&f.measure, value, &tags);
    }

    let AggregationData::Distribution(dist) = f.view.row(&["FetchMatches"]).unwrap().data else {
        panic!("expected distribution data");
    };
    assert_eq!(dist.count, 5);
    assert_eq!(dist.sum, 25.5);
    // bounds are inclusive upper bounds
    assert_eq!(dist.bucket_counts, [2, 1, 1, 1]);
    assert_eq!(
        dist.cumulative_buckets(),
        [(1.0, 2), (5.0, 3), (10.0, 4), (f64::INFINITY, 5)]
    );
}

#[test]
fn test_tags_are_projected_per_view() {
    let registry = Registry::new();
    let measure = registry
        .register_measure::<i64>("backendapi/requests_total", "Requests", "1")
        .unwrap();
    let method = registry.register_tag_key("method").unwrap();
    let status = registry.register_tag_key("status").unwrap();

    let by_method = registry
        .register_view(
            ViewDefinition::new("requests/by_method", &measure, Aggregation::Count)
                .with_tag_keys([&method]),
        )
        .unwrap();
    let total = registry
        .register_view(ViewDefinition::new("requests/total", &measure, Aggregation::Count))
        .unwrap();

    let recorder = registry.recorder();
    for status_value in ["ok", "error", "ok"] {
        recorder.record(
            &measure,
            1,
            &TagMap::new()
                .with(&method, "FetchMatches")
                .with(&status, status_value),
        );
    }

    assert_eq!(by_method.rows().len(), 1);
    assert_eq!(
        by_method.row(&["FetchMatches"]).unwrap().data,
        AggregationData::Count(3)
    );
    assert_eq!(total.row(&[]).unwrap().data, AggregationData::Count(3));
}

#[test]
fn test_missing_tag_is_recorded_as_missing() {
    let f = fixture(Aggregation::Count);
    f.recorder.record(&f.measure, 1.0, &TagMap::new());

    let rows = f.view.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tags, [("method".to_owned(), None)]);
    assert_eq!(rows[0].data, AggregationData::Count(1));
}
