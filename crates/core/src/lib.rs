//! Domain layer of the webhook receiver: wire types, the envelope decoder and
//! the mapping from events to persisted message records.

pub mod decoder;
pub mod record;
pub mod types;

pub use decoder::{decode_envelope, DecodeError};
pub use record::{map_event, KeyedRecord, MessageRecord, Unmapped, MESSAGES_COLLECTION};
pub use types::{ContentProvider, Envelope, Event, Message, MessageContent, Source, SourceKind};
