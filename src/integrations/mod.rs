//! External integrations module.
//!
//! Provides clients for:
//! - Google Gemini (vision, used as an OCR backend)

pub mod gemini;

pub use gemini::GeminiClient;
