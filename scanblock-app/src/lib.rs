mod app;
mod keys;
mod presenter;

pub use app::{App, DisplayRequest, run_windowed};
pub use keys::key_name;
pub use presenter::{WindowPresenter, wait_for_key};
