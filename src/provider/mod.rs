pub mod types;
pub mod provider;
pub mod http;
pub mod mock;

#[cfg(test)]
mod tests;

pub use types::*;
pub use provider::{CompletionProvider, SharedProvider};
pub use http::HttpCompletionProvider;
pub use mock::MockCompletionProvider;
