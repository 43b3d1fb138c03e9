pub mod coordination;
pub mod counters;
pub mod kafka;
pub mod persistence;
