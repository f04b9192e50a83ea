pub mod common;
pub mod info;
pub mod gap;
pub mod band;
pub mod effmass;
