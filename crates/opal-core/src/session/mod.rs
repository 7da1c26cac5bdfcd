//! Session domain: models, messages, rubrics, and the bounded store.

pub mod message;
pub mod model;
pub mod rubric;
pub mod store;

pub use message::{Message, MessageMeta, MessageRole};
pub use model::Session;
pub use rubric::{Rubric, RubricHistoryEntry};
pub use store::SessionStore;
