//! Publishing views through an OpenTelemetry meter provider.

use opentelemetry::metrics::MeterProvider;

use backendapi_stats::{
    Aggregation, Exporter, MetricKind, Registry, TagMap, ViewDefinition, otel::OtelBridge,
};

#[path = "../src/test_utils.rs"]
mod test_utils;

use test_utils::{ObservedPoint, SharedManualReader, labels, observed_points};

#[test]
fn test_views_are_observed() {
    let registry = Registry::new();
    let requests = registry
        .register_measure::<i64>("backendapi/requests_total", "Requests", "1")
        .unwrap();
    let payload = registry
        .register_measure::<f64>("backendapi/payload_bytes", "Payload size", "By")
        .unwrap();
    let method = registry.register_tag_key("method").unwrap();

    for definition in [
        ViewDefinition::new("requests", &requests, Aggregation::Count).with_tag_keys([&method]),
        ViewDefinition::new("payload/total", &payload, Aggregation::Sum),
        ViewDefinition::new("payload/last", &payload, Aggregation::LastValue),
        ViewDefinition::new(
            "payload/distribution",
            &payload,
            Aggregation::distribution([64.0, 1024.0]).unwrap(),
        ),
    ] {
        registry.register_view(definition).unwrap();
    }

    let (reader, provider) = SharedManualReader::with_provider();
    let exporter = Exporter::new(&registry, "open_match").unwrap();
    let bridge = OtelBridge::install(&exporter, &provider.meter("backendapi"));

    assert_eq!(
        bridge.metrics(),
        [
            ("open_match_payload_last".to_owned(), MetricKind::Gauge),
            ("open_match_payload_total".to_owned(), MetricKind::Untyped),
            ("open_match_requests".to_owned(), MetricKind::Counter),
        ]
    );

    let recorder = registry.recorder();
    for _ in 0..3 {
        recorder.record(&requests, 1, &TagMap::new().with(&method, "FetchMatches"));
    }
    recorder.record(
        &requests,
        1,
        &TagMap::new().with(&method, "CreateAssignments"),
    );
    // missing tag values are not observed
    recorder.record(&requests, 1, &TagMap::new());
    recorder.record(&payload, 100.0, &TagMap::new());
    recorder.record(&payload, 28.0, &TagMap::new());

    let observed = observed_points(&reader.collect_now());
    assert_eq!(
        observed.keys().map(String::as_str).collect::<Vec<_>>(),
        [
            "open_match_payload_last",
            "open_match_payload_total",
            "open_match_requests",
        ]
    );
    assert_eq!(
        observed["open_match_requests"],
        [
            ObservedPoint {
                attributes: labels(&[("method", "CreateAssignments")]),
                value: 1.0,
            },
            ObservedPoint {
                attributes: labels(&[("method", "FetchMatches")]),
                value: 3.0,
            },
        ]
    );
    assert_eq!(
        observed["open_match_payload_total"],
        [ObservedPoint {
            attributes: Vec::new(),
            value: 128.0,
        }]
    );
    assert_eq!(
        observed["open_match_payload_last"],
        [ObservedPoint {
            attributes: Vec::new(),
            value: 28.0,
        }]
    );
}

#[test]
fn test_default_views_are_bridged() {
    let stats = backendapi_stats::configure()
        .with_namespace("open_match")
        .with_default_views(true)
        .finish()
        .unwrap();
    let (reader, provider) = SharedManualReader::with_provider();
    let bridge = OtelBridge::install(stats.exporter(), &provider.meter("backendapi"));
    assert_eq!(bridge.metrics().len(), 7);

    let backend = stats.backend().unwrap();
    stats
        .recorder()
        .record(&backend.failures, 1, &TagMap::new());

    let observed = observed_points(&reader.collect_now());
    assert_eq!(
        observed["open_match_failures"],
        [ObservedPoint {
            attributes: Vec::new(),
            value: 1.0,
        }]
    );
}
