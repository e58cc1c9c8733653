//! LLM boundary: a single non-streaming chat completion per answer.

pub mod chat;

pub use chat::{ChatClient, ChatPrompt};
