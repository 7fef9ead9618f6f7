pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod models;

pub use chat::{ChannelInfo, ChatClient, ChatError, ChatMessage, SlackChatClient};
pub use config::VigilConfig;
pub use error::VigilError;
pub use generation::{GeminiGenerationClient, GenerationConfig, GenerationError, TextGenerator};
