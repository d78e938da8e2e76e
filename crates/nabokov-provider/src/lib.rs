//! nabokov-provider: provider abstraction and streaming generation pipeline.
//!
//! Every transport is normalized into one [`EventStream`] contract: zero or
//! more tokens followed by exactly one `Done` or `Error`.

mod error;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod stream;
pub mod traits;
pub mod types;

pub use error::ProviderError;
pub use registry::{
    GenerationService, GenerationStream, PreparedRequest, ProviderRegistry, ProviderSelection,
    ALTERNATE_PROVIDER_KEY, DEFAULT_PROVIDER_KEY,
};
pub use stream::Terminated;
pub use traits::{collect_text, Provider, StreamObserver};
pub use types::{
    now_millis, EventStream, GenerationOptions, Message, MessageContent, Metadata,
    ModelSelection, ProviderOptions, ProviderRequest, ProviderResponse, Role, StreamEvent,
};
