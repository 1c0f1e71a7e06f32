pub mod chart;
pub mod corr;
pub mod setup;
pub mod summary;
pub mod ui;
