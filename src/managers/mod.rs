pub mod logging;
pub mod notification;
pub mod snapshot;
