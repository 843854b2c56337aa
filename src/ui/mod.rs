mod app;
mod state;

pub use app::ChatApp;
pub use state::{AppState, SnapshotDiff, render_message};
