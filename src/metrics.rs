use std::sync::LazyLock;

use prometheus::*;

static METRIC_REQUEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("imvision_request_count", "count of the handled requests", &["endpoint"])
        .unwrap()
});

static METRIC_DETECTION_COUNT: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imvision_detection_count",
        "number of objects detected per analyzed image",
        (0..=20).map(|x| x as f64).collect()
    )
    .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("imvision_search_duration", "duration of the similar image search in seconds")
        .unwrap()
});

static METRIC_INDEX_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("imvision_index_size", "number of images in the feature index").unwrap()
});

/// 增加接口请求计数
pub fn inc_request_count(endpoint: &str) {
    METRIC_REQUEST_COUNT.with_label_values(&[endpoint]).inc();
}

pub fn observe_detection_count(count: usize) {
    METRIC_DETECTION_COUNT.observe(count as f64);
}

pub fn observe_search_duration(duration: f32) {
    METRIC_SEARCH_DURATION.observe(duration as f64);
}

pub fn set_index_size(size: usize) {
    METRIC_INDEX_SIZE.set(size as i64);
}
