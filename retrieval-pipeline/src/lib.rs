#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod communities;
pub mod graph;
pub mod planner;
