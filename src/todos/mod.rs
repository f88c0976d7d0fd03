//! Todos: derived, prioritized work items over the lead snapshot.

pub mod completed;
pub mod derive;
pub mod model;

pub use completed::CompletedTodos;
pub use derive::{FollowUpThresholds, arrange, derive_todos};
pub use model::{Todo, TodoBoard, TodoCategory, TodoCommand, TodoPriority};
