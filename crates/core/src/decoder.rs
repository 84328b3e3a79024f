use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::types::{ContentProvider, Envelope, Event, Message, MessageContent, Source, SourceKind};

/// Errors that can occur while decoding a verified webhook body.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a verified request body into a fresh [`Envelope`].
///
/// Field names are matched exactly. Fields that are missing or `null` decode to
/// their zero value and unknown message types decode to
/// [`MessageContent::Unsupported`].
pub fn decode_envelope(body: &[u8]) -> Result<Envelope, DecodeError> {
    let wire: WireEnvelope = serde_json::from_slice(body)?;
    Ok(wire.into())
}

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    destination: String,
    #[serde(default, deserialize_with = "null_as_default")]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    event_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    reply_token: String,
    #[serde(default, deserialize_with = "null_as_default")]
    source: WireSource,
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSource {
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    source_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    group_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    id: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    message_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    package_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    sticker_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    file_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    file_size: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    latitude: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    longitude: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    duration: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    content_provider: WireContentProvider,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContentProvider {
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    provider_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    original_content_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    preview_image_url: String,
}

impl From<WireEnvelope> for Envelope {
    fn from(wire: WireEnvelope) -> Self {
        Self {
            destination: wire.destination,
            events: wire.events.into_iter().map(Event::from).collect(),
        }
    }
}

impl From<WireEvent> for Event {
    fn from(wire: WireEvent) -> Self {
        Self {
            event_type: wire.event_type,
            timestamp: wire.timestamp,
            reply_token: wire.reply_token,
            source: wire.source.into(),
            message: wire.message.map(Message::from),
        }
    }
}

impl From<WireSource> for Source {
    fn from(wire: WireSource) -> Self {
        Self {
            kind: SourceKind::from_tag(&wire.source_type),
            user_id: wire.user_id,
            group_id: wire.group_id,
            room_id: wire.room_id,
        }
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let provider = ContentProvider {
            provider_type: wire.content_provider.provider_type,
            original_content_url: wire.content_provider.original_content_url,
            preview_image_url: wire.content_provider.preview_image_url,
        };
        let content = match wire.message_type.as_str() {
            "text" => MessageContent::Text { text: wire.text },
            "image" => MessageContent::Image { provider },
            "video" => MessageContent::Video {
                provider,
                duration: wire.duration,
            },
            "audio" => MessageContent::Audio {
                provider,
                duration: wire.duration,
            },
            "file" => MessageContent::File {
                file_name: wire.file_name,
                file_size: wire.file_size,
            },
            "location" => MessageContent::Location {
                title: wire.title,
                address: wire.address,
                latitude: wire.latitude,
                longitude: wire.longitude,
            },
            "sticker" => MessageContent::Sticker {
                package_id: wire.package_id,
                sticker_id: wire.sticker_id,
            },
            _ => MessageContent::Unsupported {
                message_type: wire.message_type,
            },
        };

        Self {
            id: wire.id,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_text_event_field_for_field() {
        let body = json!({
            "destination": "d1",
            "events": [{
                "type": "message",
                "timestamp": 123456789,
                "replyToken": "rt1",
                "source": {"type": "user", "userId": "u1"},
                "message": {"id": "m1", "type": "text", "text": "hello"}
            }]
        })
        .to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("decode");
        assert_eq!(envelope.destination, "d1");
        assert_eq!(envelope.events.len(), 1);

        let event = &envelope.events[0];
        assert_eq!(event.event_type, "message");
        assert_eq!(event.timestamp, 123456789);
        assert_eq!(event.reply_token, "rt1");
        assert_eq!(event.source.kind, SourceKind::User);
        assert_eq!(event.source.user_id, "u1");
        assert_eq!(event.source.group_id, "");
        assert_eq!(event.source.room_id, "");
        assert_eq!(
            event.message,
            Some(Message {
                id: "m1".to_string(),
                content: MessageContent::Text {
                    text: "hello".to_string()
                },
            })
        );
    }

    #[test]
    fn decodes_every_event_in_order() {
        let events: Vec<_> = (0..5)
            .map(|i| {
                json!({
                    "type": "message",
                    "timestamp": 1000 + i,
                    "replyToken": format!("rt-{i}"),
                    "source": {"type": "group", "groupId": "g1", "userId": format!("u-{i}")},
                    "message": {"id": format!("m-{i}"), "type": "sticker", "packageId": "1", "stickerId": "2"}
                })
            })
            .collect();
        let body = json!({"destination": "d1", "events": events}).to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("decode");
        assert_eq!(envelope.events.len(), 5);
        for (i, event) in envelope.events.iter().enumerate() {
            assert_eq!(event.timestamp, 1000 + i as i64);
            assert_eq!(event.reply_token, format!("rt-{i}"));
            assert_eq!(event.source.kind, SourceKind::Group);
            assert_eq!(event.source.group_id, "g1");
            let message = event.message.as_ref().expect("message present");
            assert_eq!(message.id, format!("m-{i}"));
        }
    }

    #[test]
    fn decodes_media_with_content_provider() {
        let body = json!({
            "destination": "d1",
            "events": [{
                "type": "message",
                "timestamp": 1,
                "replyToken": "rt",
                "source": {"type": "room", "roomId": "r1"},
                "message": {
                    "id": "m-video",
                    "type": "video",
                    "duration": 60000,
                    "contentProvider": {
                        "type": "external",
                        "originalContentUrl": "https://example.com/v.mp4",
                        "previewImageUrl": "https://example.com/v.jpg"
                    }
                }
            }]
        })
        .to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("decode");
        let event = &envelope.events[0];
        assert_eq!(event.source.kind, SourceKind::Room);
        assert_eq!(event.source.room_id, "r1");
        let message = event.message.as_ref().expect("message");
        assert_eq!(
            message.content,
            MessageContent::Video {
                provider: ContentProvider {
                    provider_type: "external".to_string(),
                    original_content_url: "https://example.com/v.mp4".to_string(),
                    preview_image_url: "https://example.com/v.jpg".to_string(),
                },
                duration: 60000,
            }
        );
    }

    #[test]
    fn decodes_location_and_file_fields() {
        let body = json!({
            "destination": "d1",
            "events": [
                {
                    "type": "message",
                    "timestamp": 1,
                    "source": {"type": "user", "userId": "u1"},
                    "message": {"id": "m-loc", "type": "location", "title": "Office", "address": "Tokyo", "latitude": 35.65910807942215, "longitude": 139.70372892916203}
                },
                {
                    "type": "message",
                    "timestamp": 2,
                    "source": {"type": "user", "userId": "u1"},
                    "message": {"id": "m-file", "type": "file", "fileName": "report.pdf", "fileSize": 2138}
                }
            ]
        })
        .to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("decode");
        let location = &envelope.events[0].message.as_ref().expect("message").content;
        assert_eq!(
            location,
            &MessageContent::Location {
                title: "Office".to_string(),
                address: "Tokyo".to_string(),
                latitude: 35.65910807942215,
                longitude: 139.70372892916203,
            }
        );
        assert_eq!(envelope.events[0].reply_token, "");

        let file = &envelope.events[1].message.as_ref().expect("message").content;
        assert_eq!(
            file,
            &MessageContent::File {
                file_name: "report.pdf".to_string(),
                file_size: 2138,
            }
        );
    }

    #[test]
    fn keeps_unknown_message_types_and_non_message_events() {
        let body = json!({
            "destination": "d1",
            "events": [
                {
                    "type": "message",
                    "timestamp": 1,
                    "source": {"type": "user", "userId": "u1"},
                    "message": {"id": "m-x", "type": "imagemap"}
                },
                {
                    "type": "follow",
                    "timestamp": 2,
                    "replyToken": "rt-follow",
                    "source": {"type": "user", "userId": "u1"}
                }
            ]
        })
        .to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("decode");
        assert_eq!(envelope.events.len(), 2);
        assert_eq!(
            envelope.events[0].message.as_ref().map(|m| &m.content),
            Some(&MessageContent::Unsupported {
                message_type: "imagemap".to_string()
            })
        );
        assert_eq!(envelope.events[1].event_type, "follow");
        assert!(envelope.events[1].message.is_none());
    }

    #[test]
    fn null_fields_decode_to_zero_values() {
        let body = json!({
            "destination": null,
            "events": [{
                "type": "message",
                "timestamp": null,
                "replyToken": null,
                "source": {"type": "group", "userId": null, "groupId": null, "roomId": null},
                "message": {
                    "id": "m-null",
                    "type": "image",
                    "text": null,
                    "fileSize": null,
                    "latitude": null,
                    "contentProvider": {"type": "line", "originalContentUrl": null, "previewImageUrl": null}
                }
            }]
        })
        .to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("nulls are zero values");
        assert_eq!(envelope.destination, "");
        let event = &envelope.events[0];
        assert_eq!(event.timestamp, 0);
        assert_eq!(event.reply_token, "");
        assert_eq!(event.source.kind, SourceKind::Group);
        assert_eq!(event.source.group_id, "");
        assert_eq!(event.source.user_id, "");
        assert_eq!(
            event.message.as_ref().map(|m| &m.content),
            Some(&MessageContent::Image {
                provider: ContentProvider {
                    provider_type: "line".to_string(),
                    original_content_url: String::new(),
                    preview_image_url: String::new(),
                },
            })
        );
    }

    #[test]
    fn null_containers_decode_to_empty_values() {
        let body = json!({
            "destination": "d1",
            "events": [{
                "type": "follow",
                "replyToken": "rt",
                "source": null,
                "message": null
            }]
        })
        .to_string();

        let envelope = decode_envelope(body.as_bytes()).expect("decode");
        let event = &envelope.events[0];
        assert_eq!(event.source, Source::default());
        assert!(event.message.is_none());

        let envelope = decode_envelope(br#"{"destination":"d1","events":null}"#).expect("decode");
        assert!(envelope.events.is_empty());
    }

    #[test]
    fn empty_object_decodes_to_empty_envelope() {
        let envelope = decode_envelope(b"{}").expect("decode");
        assert_eq!(envelope, Envelope::default());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = decode_envelope(b"{\"destination\": ").expect_err("truncated body");
        assert!(matches!(err, DecodeError::Json(_)));

        let err = decode_envelope(b"{\"events\": {}}").expect_err("events must be an array");
        assert!(err.to_string().starts_with("failed to parse payload"));
    }
}
