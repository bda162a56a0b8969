pub mod events;
pub mod models;

pub use events::{AuthRequest, ChatMessage, ChatSend, ServerEvent};
pub use models::{UserId, UserSummary};
