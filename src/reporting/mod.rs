pub mod formatter;
pub mod sink;
pub mod status;
pub mod webhook;

pub use formatter::{format_result, format_status};
pub use sink::{ReportSink, ResultRecord};
pub use status::spawn_status_reporter;
pub use webhook::WebhookNotifier;
