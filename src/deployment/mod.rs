pub mod connection;
pub mod deployment;
pub mod keys;
pub mod prompt;
