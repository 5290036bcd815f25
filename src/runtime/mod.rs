pub mod engine;
pub mod generation_settings;
pub mod prompts;
pub mod recovery;
pub mod sessions;
pub mod state;

#[cfg(test)]
mod engine_tests;
