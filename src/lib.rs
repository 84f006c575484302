pub mod app;
pub mod catalog;
pub mod error;
pub mod handlers;
pub mod model_filter;
pub mod relay;
pub mod sanitize;
pub mod synthetic;
pub mod upstream;
