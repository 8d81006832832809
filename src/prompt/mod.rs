pub mod builder;
pub mod instructions;
pub mod model;
pub mod transcript;

pub use builder::{Prompt, build_messages_for_chat_api, build_prompt};
pub use instructions::InstructionStore;
pub use model::{ModelFamily, ToolSpec, TurnContext};
pub use transcript::{ChatMessage, Part, ResponseItem};
