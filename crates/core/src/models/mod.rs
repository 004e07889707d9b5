pub mod currency;
pub mod entry;
pub mod portfolio;
pub mod query;
pub mod settings;
pub mod tag_index;
