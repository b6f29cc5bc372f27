pub mod invoke;
pub mod render;

pub use invoke::handle_invoke_command;
pub use render::handle_render_command;
