//! Jira Cloud directory: bulk user resolution for timer owners.

pub mod api_types;
pub mod client;

pub use client::DirectoryClient;
