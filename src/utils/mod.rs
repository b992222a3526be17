pub mod text;
pub mod time;
pub mod url;
pub mod validation;

pub use text::longest_substr;
pub use time::parse_time;
pub use url::{basic_sanitizing, url_fix};
