//! ragbot-agent - Retrieval-augmented chat agent
//!
//! Wires a splitter, an embedder, a [`VectorStore`](ragbot_store::VectorStore)
//! and a chat model into one conversational loop:
//!
//! - [`Agent::ingest`] splits, embeds and stores a document.
//! - [`Agent::ask`] answers from retrieved references.
//! - [`Agent::chat`] talks to the model with a rolling history.

mod agent;
mod chat;
mod history;
mod prompt;

pub use agent::{Agent, Answer};
pub use chat::OpenAiChatModel;
pub use history::ChatHistory;
pub use prompt::{conversation_prompt, document_prompt};

pub use ragbot_core::ChatModel;
