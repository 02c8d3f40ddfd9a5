pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod process;
pub mod storage;
