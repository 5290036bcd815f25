//! Chat Completions client used to generate and narrate simulations.
//!
//! ## Structure
//!
//! - `types`: request/response types and `ModelError`
//! - `traits`: the `SimulationModel` seam the engine talks to
//! - `catalog`: known models and defaults
//! - `shared`: JSON extraction and text cleanup for model output
//! - `openai`: the OpenAI-compatible HTTP client

pub mod catalog;
pub mod openai;
pub mod shared;
pub mod traits;
pub mod types;


pub use catalog::ModelCatalog;
pub use openai::OpenAiClient;
pub use shared::{parse_json_payload, strip_code_fences};
pub use traits::SimulationModel;
pub use types::{ChatMessage, ChatReply, ChatRequest, ChatRole, ModelError, TokenUsage};
