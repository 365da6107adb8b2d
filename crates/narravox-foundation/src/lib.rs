pub mod cancel;
pub mod error;
pub mod ids;

pub use cancel::CancelToken;
pub use error::{EngineError, ProviderError, StoreError};
pub use ids::{JobId, UserId};
