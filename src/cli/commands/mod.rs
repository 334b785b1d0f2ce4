pub mod config;
pub mod history;
pub mod init;
pub mod run;
pub mod schedule;
pub mod tenant;
