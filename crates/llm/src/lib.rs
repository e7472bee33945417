pub mod chat_completions;
pub mod registry;
pub mod streaming;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

pub use chat_completions::ChatCompletionsAdapter;
pub use registry::{DefaultKind, ModelRegistry};
pub use traits::{ChatResponse, GenerateOptions, LlmProvider, ThinkingMode};
