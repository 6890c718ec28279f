//! Clockwork upstream: the cookie-to-token servlet exchange and the Report
//! API (active-timer listing, timer stop).

pub mod api_types;
pub mod client;
pub mod token;

pub use client::ReportClient;
