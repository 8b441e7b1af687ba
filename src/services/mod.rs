pub mod aggregator;
pub mod cache_service;
pub mod diagnostic_logger;
pub mod drops_backend;
pub mod drops_manager;
pub mod drops_state;
pub mod favorite_notifier;
pub mod kv_store;
pub mod live_reconciler;
pub mod queue_controller;
pub mod source_fetcher;

#[cfg(test)]
pub(crate) mod test_support;
