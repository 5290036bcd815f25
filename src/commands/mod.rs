pub mod admin;
pub mod providers;
pub mod sessions;
pub mod simulations;
