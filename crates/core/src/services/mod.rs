pub mod currency_service;
pub mod graph_service;
pub mod price_sync;
