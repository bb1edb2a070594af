pub mod config;
pub mod error;
pub mod event;
pub mod expand;
pub mod history;
pub mod registry;
pub mod storage;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, TutorError};
pub use event::AppEventBus;
pub use types::*;
