pub mod message;
pub mod provider;
pub mod session;
pub mod transcript;

pub use message::{Message, Role};
pub use provider::ProviderId;
pub use session::Session;
pub use transcript::Transcript;
