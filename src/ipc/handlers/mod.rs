pub mod core;
pub mod scores;
pub mod setup;
pub mod students;
pub mod term;
