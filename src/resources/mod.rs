pub mod common;
pub mod job;
