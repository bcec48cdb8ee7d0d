pub mod general;
pub mod settlement;
pub mod stats;
