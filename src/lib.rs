//! Storefront Guard - Request Throttling for the Storefront Admin Backend
//!
//! This crate implements the admission guard placed in front of the
//! storefront's HTTP resources. Each request is bucketed by client address
//! and counted against a per-route policy: login and registration, file
//! uploads, and a configurable default for everything else.

pub mod config;
pub mod error;
pub mod http;
pub mod throttle;
