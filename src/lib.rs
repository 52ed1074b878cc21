// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod fetcher;
pub mod logger;
pub mod observability;
pub mod prompt;
pub mod render;
pub mod utils;
pub mod window;

// Re-exports
pub use client::{GenerationOptions, Inference, LlamaClient};
pub use error::{Error, InferenceFailure, Result};
pub use fetcher::{Article, BlogFetcher, Category, Fetcher};
pub use logger::{ChatTurn, SessionLogger};
pub use observability::register_biometrics;
pub use prompt::{Prompt, PromptComposer};
pub use render::{PlainTextRenderer, Renderer};
pub use window::{ChatWindow, WindowAction};
