pub mod dispatch;
pub mod jobs;
pub mod penalty;
pub mod presence;
pub mod quotes;
pub mod ranking;
pub mod sweep;
