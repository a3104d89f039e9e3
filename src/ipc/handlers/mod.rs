pub mod config;
pub mod core;
pub mod exchange;
pub mod ledger;
pub mod marks;
pub mod promotion;
pub mod students;
pub mod subjects;
