pub mod config;
pub mod deploy_request;
