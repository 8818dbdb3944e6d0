//! Chat client for NutriBot, a nutrition-advice assistant backed by
//! Google's Gemini streaming API.
//!
//! The crate keeps an ordered conversation log, replays it (with a fixed
//! instruction preamble) on every turn, and surfaces the streamed reply
//! incrementally while it arrives.

pub mod ai;
pub mod error;
pub mod models;
pub mod prompts;
pub mod session;

pub use error::{Error, Result};
