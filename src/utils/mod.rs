pub mod clock;
pub mod text;
pub mod time_parser;

pub use clock::{Clock, ManualClock, SystemClock};
pub use text::truncate_chars;
pub use time_parser::{format_timestamp, parse_timestamp};
