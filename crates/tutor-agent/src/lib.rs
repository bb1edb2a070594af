mod cli;
mod stream;

pub use cli::CliAgent;
pub use stream::{message_stream, parse_line};
