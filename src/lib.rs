//! Payment orchestration core for an investment crowdfunding platform.
//!
//! Drives a pending investment to a terminal paid state across two mutually
//! exclusive provider paths: a direct card-authorization flow and a
//! redirect/poll flow against a provider-hosted checkout window.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
