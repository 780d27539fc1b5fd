mod event_log;
pub use event_log::EventLog;

mod view;
pub use view::{log_event, message_for};
