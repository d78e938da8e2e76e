//! Cards, their store, and the streaming generation lifecycle that writes
//! provider output into them.

pub mod card;
mod error;
pub mod features;
pub mod html;
pub mod session;
pub mod store;

pub use card::{
    Card, CardMetadata, CardType, ConversationEntry, FillInHistoryEntry, FillInStrategy,
    GenerationContext, Position, Size,
};
pub use error::{SessionError, StoreError};
pub use session::{
    finalize_with, CancelBehavior, CancelHandle, ContentStrategy, GenerationSession, RawText,
    RunningSession, SessionConfig, SessionOutcome, StreamingMode, DEFAULT_PLACEHOLDER,
};
pub use store::{MemoryStore, Store, StoreEvent};
