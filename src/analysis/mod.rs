pub mod baseline;
pub mod plan;
pub mod predicates;
pub mod recommend;
pub mod usage;
