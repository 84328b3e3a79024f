use serde::Serialize;

use crate::types::{ContentProvider, Event, MessageContent};

/// Fixed name of the collection message documents are written to.
pub const MESSAGES_COLLECTION: &str = "Messages";

/// Flattened document persisted for one message.
///
/// Every shape carries the [`RecordHeader`]; the [`RecordContent`] variant
/// contributes the fields of its message type only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(flatten)]
    pub content: RecordContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordHeader {
    pub timestamp: i64,
    #[serde(rename = "replyToken")]
    pub reply_token: String,
    #[serde(rename = "sourceType")]
    pub source_type: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "roomID")]
    pub room_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordContent {
    Text(TextFields),
    Media(MediaFields),
    File(FileFields),
    Location(LocationFields),
    Sticker(StickerFields),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFields {
    pub text: String,
}

/// Shared by image, video and audio. `duration` is only present for video and audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFields {
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "originalContentURL")]
    pub original_content_url: String,
    #[serde(rename = "previewImageURL")]
    pub preview_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFields {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFields {
    pub title: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickerFields {
    #[serde(rename = "packageID")]
    pub package_id: String,
    #[serde(rename = "stickerID")]
    pub sticker_id: String,
}

/// A mapped record together with the key it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub message_id: String,
    pub record: MessageRecord,
}

/// Why an event produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unmapped {
    /// The event carries no message (follow, join, postback, ...).
    NoMessage { event_type: String },
    /// The message type has no record shape.
    UnsupportedType { message_id: String, message_type: String },
    /// The message carries no identifier to key its document by.
    MissingId { message_type: String },
}

impl Unmapped {
    /// Label used for logs and metrics.
    pub fn type_label(&self) -> &str {
        match self {
            Self::NoMessage { event_type } => event_type,
            Self::UnsupportedType { message_type, .. } | Self::MissingId { message_type } => {
                message_type
            }
        }
    }
}

/// Projects an event into the record stored for its message.
pub fn map_event(event: &Event) -> Result<KeyedRecord, Unmapped> {
    let Some(message) = event.message.as_ref() else {
        return Err(Unmapped::NoMessage {
            event_type: event.event_type.clone(),
        });
    };
    if message.id.is_empty() {
        return Err(Unmapped::MissingId {
            message_type: message.content.type_tag().to_string(),
        });
    }

    let content = match &message.content {
        MessageContent::Text { text } => map_text(text),
        MessageContent::Image { provider } => map_media(provider, None),
        MessageContent::Video { provider, duration }
        | MessageContent::Audio { provider, duration } => map_media(provider, Some(*duration)),
        MessageContent::File {
            file_name,
            file_size,
        } => map_file(file_name, *file_size),
        MessageContent::Location {
            title,
            address,
            latitude,
            longitude,
        } => map_location(title, address, *latitude, *longitude),
        MessageContent::Sticker {
            package_id,
            sticker_id,
        } => map_sticker(package_id, sticker_id),
        MessageContent::Unsupported { message_type } => {
            return Err(Unmapped::UnsupportedType {
                message_id: message.id.clone(),
                message_type: message_type.clone(),
            })
        }
    };

    Ok(KeyedRecord {
        message_id: message.id.clone(),
        record: MessageRecord {
            header: map_header(event, message.content.type_tag()),
            content,
        },
    })
}

fn map_header(event: &Event, message_type: &str) -> RecordHeader {
    RecordHeader {
        timestamp: event.timestamp,
        reply_token: event.reply_token.clone(),
        source_type: event.source.kind.as_str().to_string(),
        user_id: event.source.user_id.clone(),
        group_id: event.source.group_id.clone(),
        room_id: event.source.room_id.clone(),
        message_type: message_type.to_string(),
    }
}

fn map_text(text: &str) -> RecordContent {
    RecordContent::Text(TextFields {
        text: text.to_string(),
    })
}

fn map_media(provider: &ContentProvider, duration: Option<i64>) -> RecordContent {
    RecordContent::Media(MediaFields {
        content_type: provider.provider_type.clone(),
        original_content_url: provider.original_content_url.clone(),
        preview_image_url: provider.preview_image_url.clone(),
        duration,
    })
}

fn map_file(file_name: &str, file_size: i64) -> RecordContent {
    RecordContent::File(FileFields {
        file_name: file_name.to_string(),
        file_size,
    })
}

fn map_location(title: &str, address: &str, latitude: f64, longitude: f64) -> RecordContent {
    RecordContent::Location(LocationFields {
        title: title.to_string(),
        address: address.to_string(),
        latitude,
        longitude,
    })
}

fn map_sticker(package_id: &str, sticker_id: &str) -> RecordContent {
    RecordContent::Sticker(StickerFields {
        package_id: package_id.to_string(),
        sticker_id: sticker_id.to_string(),
    })
}
