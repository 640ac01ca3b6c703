pub mod catalog;
pub mod http;
pub mod traits;
pub mod types;

pub use catalog::ModelCatalog;
pub use http::HttpBackend;
pub use traits::ChatBackend;
pub use types::{BackendError, ChatRequest, ImageRequest};

#[cfg(test)]
pub mod testing;
