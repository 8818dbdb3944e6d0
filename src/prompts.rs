//! Fixed prompt and message text.
//!
//! The instruction preamble lives in `data/prompts/` so it can be edited
//! without touching code; the short user-visible strings stay inline.

/// Instruction preamble prepended to every request's history.
pub const SYSTEM_PREAMBLE: &str = include_str!("../data/prompts/system.txt");

/// Synthetic assistant greeting that seeds a fresh conversation log.
pub const GREETING: &str =
    "Hi there! I'm NutriBot. How can I help you with your nutrition today?";

/// Display text substituted when a turn carries an image but no text.
pub const IMAGE_ONLY_PLACEHOLDER: &str = "User uploaded an image:";

/// Fixed assistant message appended when the remote call fails.
pub const REMOTE_FAILURE_MESSAGE: &str =
    "Sorry, I encountered an error. Please check your API key and try again.";

/// Shown once at startup and again on every submit while the key is absent.
pub const API_KEY_WARNING: &str =
    "API key is missing. Please set GEMINI_API_KEY in your environment (or a .env file) to use NutriBot.";

/// Canned questions offered as one-keystroke shortcuts.
pub const QUICK_PROMPTS: &[&str] = &[
    "What should I eat before a workout?",
    "How can I improve my diet?",
    "What are healthy snack options?",
    "How much protein do I need daily?",
];
