pub mod dispatch;
pub mod event;
pub mod job;
pub mod operator;
pub mod request;
