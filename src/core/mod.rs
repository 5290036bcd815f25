pub mod case;
pub mod catalog;
pub mod scoring;
pub mod session;
