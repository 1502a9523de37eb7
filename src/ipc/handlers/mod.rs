pub mod ai;
pub mod core;
pub mod documents;
pub mod preview;
pub mod record;
pub mod setup;
