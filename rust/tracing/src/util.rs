use opentelemetry::KeyValue;
use std::time::Instant;

/// Records the milliseconds between its creation and its drop into a histogram.
pub struct Stopwatch<'a> {
    histogram: &'a opentelemetry::metrics::Histogram<u64>,
    attributes: &'a [KeyValue],
    started_at: Instant,
}

impl<'a> Stopwatch<'a> {
    pub fn new(
        histogram: &'a opentelemetry::metrics::Histogram<u64>,
        attributes: &'a [KeyValue],
    ) -> Self {
        Self {
            histogram,
            attributes,
            started_at: Instant::now(),
        }
    }
}

impl Drop for Stopwatch<'_> {
    fn drop(&mut self) {
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        self.histogram.record(elapsed, self.attributes);
    }
}
