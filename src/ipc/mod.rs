mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_event;
pub use types::{AppState, Event};
