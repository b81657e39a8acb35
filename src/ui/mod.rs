pub mod colorize;
pub mod render;
