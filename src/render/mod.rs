//! Local page rendering and HTML script injection.

pub mod inject;
pub mod pages;

pub use inject::ScriptInjector;
pub use pages::{html_response, Pages, RenderError};
