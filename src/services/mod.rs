pub mod bonus;
pub mod cache;
pub mod committer;
pub mod drilldown;
pub mod engine;
pub mod lifecycle;
pub mod reconciler;
pub mod stats;

#[cfg(test)]
pub mod fixtures;
