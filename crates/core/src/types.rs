use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// Decoded webhook request body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub destination: String,
    pub events: Vec<Event>,
}

/// One inbound occurrence delivered by the messaging platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Empty for events that cannot be replied to.
    pub reply_token: String,
    pub source: Source,
    /// `None` for non-message events (follow, join, postback, ...).
    pub message: Option<Message>,
}

impl Event {
    /// Returns the event timestamp as a UTC instant, when it is representable.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Context an event originated from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Source {
    pub kind: SourceKind,
    pub user_id: String,
    pub group_id: String,
    pub room_id: String,
}

/// Source type tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceKind {
    User,
    Group,
    Room,
    Other(String),
    #[default]
    Missing,
}

impl SourceKind {
    pub fn from_tag(value: &str) -> Self {
        match value {
            "user" => Self::User,
            "group" => Self::Group,
            "room" => Self::Room,
            "" => Self::Missing,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire representation of the tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Room => "room",
            Self::Other(value) => value,
            Self::Missing => "",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message attached to an event, keyed by the platform-assigned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub content: MessageContent,
}

/// Message payload variants.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        provider: ContentProvider,
    },
    Video {
        provider: ContentProvider,
        duration: i64,
    },
    Audio {
        provider: ContentProvider,
        duration: i64,
    },
    File {
        file_name: String,
        file_size: i64,
    },
    Location {
        title: String,
        address: String,
        latitude: f64,
        longitude: f64,
    },
    Sticker {
        package_id: String,
        sticker_id: String,
    },
    /// Any type tag this service does not persist. The raw tag is kept for logging.
    Unsupported {
        message_type: String,
    },
}

impl MessageContent {
    /// Returns the wire type tag of the payload.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::File { .. } => "file",
            Self::Location { .. } => "location",
            Self::Sticker { .. } => "sticker",
            Self::Unsupported { message_type } => message_type,
        }
    }
}

/// Where the binary content of an image/video/audio message is hosted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentProvider {
    /// `line` or `external`.
    pub provider_type: String,
    pub original_content_url: String,
    pub preview_image_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_known_tags() {
        for tag in ["user", "group", "room"] {
            assert_eq!(SourceKind::from_tag(tag).as_str(), tag);
        }
        assert_eq!(SourceKind::from_tag(""), SourceKind::Missing);
        assert_eq!(
            SourceKind::from_tag("square"),
            SourceKind::Other("square".to_string())
        );
    }

    #[test]
    fn event_exposes_occurrence_time() {
        let event = Event {
            event_type: "message".to_string(),
            timestamp: 1_462_629_479_859,
            reply_token: String::new(),
            source: Source::default(),
            message: None,
        };

        let occurred_at = event.occurred_at().expect("timestamp representable");
        assert_eq!(occurred_at.timestamp_millis(), 1_462_629_479_859);
    }

    #[test]
    fn unsupported_content_keeps_raw_tag() {
        let content = MessageContent::Unsupported {
            message_type: "imagemap".to_string(),
        };
        assert_eq!(content.type_tag(), "imagemap");
    }
}
