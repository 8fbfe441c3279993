mod scope;
mod todo;

pub use scope::{is_document_id, Scope};
pub use todo::{NewTodo, Snapshot, TodoItem, TodoPatch, TodoRecord};
