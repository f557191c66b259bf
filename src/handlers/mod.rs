pub mod relay;

pub use relay::{dead_letters_handler, get_batch_handler, submit_handler};
