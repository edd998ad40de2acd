pub mod core;
pub mod reports;
pub mod rosters;
pub mod sessions;
