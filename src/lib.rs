pub mod cli;
pub mod core;
pub mod deployment;
pub mod serialization;
