pub mod change_stream;
pub mod session_service;

pub use change_stream::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeListener, ChangeStream, IdFilter, ReconnectPolicy,
    StreamError,
};
pub use session_service::{
    rating_or_games_changed, ReportDispatcher, ReportError, SessionReportTrigger, TriggerOutcome,
};
