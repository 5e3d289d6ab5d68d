//! Utilities module - text helpers shared by ingestion, the agent tools and the stores

pub mod text_utils;

pub use text_utils::TextUtils;
