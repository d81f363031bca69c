pub mod settings;

pub use settings::{LoaderSettings, Settings};
