pub mod job;
pub mod signals;
