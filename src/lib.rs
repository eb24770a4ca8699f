pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod store;

pub use config::Config;
pub use convert::{detect_format, ConversionPipeline, Converter, SourceFormat};
pub use error::{ArchiveError, Result};
pub use model::{Conversation, ConversationFilter, Message};
pub use store::ArchiveStore;
