use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Telemetry {
    pub files_detected: IntCounter,
    pub files_uploaded: IntCounter,
    pub upload_failures: IntCounter,
    pub messages_published: IntCounter,
    pub publish_failures: IntCounter,
    pub poll_errors: IntCounter,
    pub messages_acked: IntCounter,
    pub messages_nacked: IntCounter,
    pub known_files: IntGauge,
    pub processing_hist: Histogram,
    pub registry: Registry,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("static counter opts are valid");
    registry.register(Box::new(c.clone())).ok();
    c
}

impl Telemetry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let files_detected = counter(&registry, "files_detected_total", "Names reported as changed by the watcher");
        let files_uploaded = counter(&registry, "files_uploaded_total", "Files uploaded to the object store");
        let upload_failures = counter(&registry, "upload_failures_total", "Failed uploads");
        let messages_published = counter(&registry, "messages_published_total", "Notifications published");
        let publish_failures = counter(&registry, "publish_failures_total", "Failed publishes");
        let poll_errors = counter(&registry, "poll_errors_total", "Poll cycles aborted by a listing error");
        let messages_acked = counter(&registry, "messages_acked_total", "Messages processed and acknowledged");
        let messages_nacked = counter(&registry, "messages_nacked_total", "Messages left for redelivery");
        let known_files = IntGauge::with_opts(Opts::new("known_files", "Files in the current watcher baseline"))
            .expect("static gauge opts are valid");
        let processing_hist =
            Histogram::with_opts(HistogramOpts::new("message_processing_seconds", "Per-message processing duration"))
                .expect("static histogram opts are valid");

        registry.register(Box::new(known_files.clone())).ok();
        registry.register(Box::new(processing_hist.clone())).ok();

        Telemetry {
            files_detected,
            files_uploaded,
            upload_failures,
            messages_published,
            publish_failures,
            poll_errors,
            messages_acked,
            messages_nacked,
            known_files,
            processing_hist,
            registry,
        }
    }

    /// Gather metrics in Prometheus text format.
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_contains_metric_names() {
        let t = Telemetry::new();
        t.files_uploaded.inc();
        t.known_files.set(3);
        let out = t.gather();
        assert!(out.contains("files_uploaded_total"), "gather output should contain metric name");
        assert!(out.contains("known_files 3"));
    }

    #[test]
    fn handles_are_independent() {
        let a = Telemetry::new();
        let b = Telemetry::new();
        a.messages_acked.inc();
        assert_eq!(a.messages_acked.get(), 1);
        assert_eq!(b.messages_acked.get(), 0);
    }
}
