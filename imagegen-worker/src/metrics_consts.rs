pub const EVENTS_RECEIVED: &str = "imagegen_events_received_total";
pub const EVENTS_IGNORED: &str = "imagegen_events_ignored_total";
pub const ARTIFACTS_STORED: &str = "imagegen_artifacts_stored_total";
pub const WRITE_BACKS: &str = "imagegen_write_backs_total";
pub const PIPELINE_ERRORS: &str = "imagegen_pipeline_errors_total";
pub const INFERENCE_TIME: &str = "imagegen_inference_duration_seconds";
pub const NOTIFICATIONS_SENT: &str = "imagegen_notifications_sent_total";
pub const NOTIFY_ERRORS: &str = "imagegen_notify_errors_total";
