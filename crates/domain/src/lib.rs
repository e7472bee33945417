pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod stream;
pub mod tool;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{CoreError, Result};
pub use event::Event;
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{
    ChainInput, ChainOutput, ContentPart, Message, MessageContent, PendingQuestion,
    QuestionAnswer, QuestionOption, Role, RunConfig, Task, TaskStatus, ToolCall, ToolDefinition,
    ToolResult,
};
