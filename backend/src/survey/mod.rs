pub mod aggregator;
pub mod model;
pub mod summary;
pub mod sweeper;
