use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("clink-reports"));

// --- Laudo extraction ---

pub static LAUDOS_EXTRACTED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("laudo.extracted")
        .with_description("Number of laudos decompressed and returned to callers")
        .with_unit("{document}")
        .build()
});

pub static LAUDO_DECOMPRESSION_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("laudo.decompression.failures")
        .with_description("Number of stored laudo blobs that could not be decompressed")
        .with_unit("{document}")
        .build()
});

pub static BUNDLES_PACKED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("bundle.packed")
        .with_description("Number of zip bundles produced")
        .with_unit("{bundle}")
        .build()
});

pub static ENGLISH_LAUDOS_RENDERED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("laudo.english.rendered")
        .with_description("Number of English laudos retrieved from the file share")
        .with_unit("{document}")
        .build()
});

// --- MRL ---

pub static MRL_SAMPLES_SUCCEEDED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mrl.samples.succeeded")
        .with_description("Number of samples for which an MRL PDF was produced")
        .with_unit("{sample}")
        .build()
});

pub static MRL_SAMPLES_FAILED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mrl.samples.failed")
        .with_description("Number of samples that failed inside an MRL run")
        .with_unit("{sample}")
        .build()
});

pub static MRL_RUN_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("mrl.run.duration")
        .with_description("Total MRL run duration in seconds")
        .with_unit("s")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            30000.0, 120000.0,
        ])
        .build()
});
