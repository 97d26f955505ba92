pub mod handlers;

pub use handlers::{default_checkpoint_path, endpoint, expand_path, format_pages};
