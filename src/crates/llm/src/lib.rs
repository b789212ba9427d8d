//! Model gateway for the agentry workspace.
//!
//! Chat and workflow crates never call a provider directly; they resolve a
//! catalog row and go through [`ModelGateway`], which owns admission control
//! (rate limiting), provider dispatch, pricing, and usage accounting.

pub mod gateway;

pub use gateway::{
    CallOptions, CallOutcome, ModelGateway, OPERATION_CHAT, OPERATION_CHAT_STREAM,
    OPERATION_WORKFLOW,
};
