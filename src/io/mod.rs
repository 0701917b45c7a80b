/// CSV export of per-vehicle and per-robot run summaries.
pub mod export;
