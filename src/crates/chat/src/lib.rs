//! Conversation orchestration for the agentry platform.
//!
//! One chat turn is a pipeline: persist the user message, assemble model
//! context (system prompt, recalled memories, recent history), call the
//! gateway, persist the reply, and feed the exchange back into memory.
//!
//! - [`service`]: the turn pipeline, streaming variant, and conversation
//!   management
//! - [`extract`]: regex extraction of durable facts from user messages

pub mod extract;
pub mod service;

pub use extract::{extract_facts, ExtractedFact};
pub use service::{ConversationService, CreateConversation, SendOptions};
