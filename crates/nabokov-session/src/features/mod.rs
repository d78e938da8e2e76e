//! Consumers of the generation session. Each builds prompts and decides how
//! the final text lands on its card; the lifecycle is shared.

pub mod card_generation;
pub mod chat;
pub mod child_generation;
pub mod fill_in;
