mod app;

pub use app::{main, run_app, version_banner, Cli};
