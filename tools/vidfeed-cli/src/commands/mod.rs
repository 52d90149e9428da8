pub mod filters;
pub mod posts;
pub mod probe;
pub mod render;
