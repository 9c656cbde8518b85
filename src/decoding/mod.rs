mod event_parsing;
mod logs;

pub use event_parsing::ParsedEvent;
pub use logs::{DecodedEvent, DecodedField, DecodedValue, EventDecoder};
