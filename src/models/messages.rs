use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{base64::Base64, serde_as};

use super::{ChatMessage, Member};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    pub document_id: String,
    pub username: String,
    pub colour: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    #[serde_as(as = "Base64")]
    pub update: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessMessage {
    pub document_id: String,
    pub update: Value,
}

/// Title updates arrive with optional fields: missing or empty values are
/// dropped by the coordinator rather than rejected at parse time.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TitleMessage {
    pub document_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendMessage {
    pub document_id: Option<String>,
    pub username: Option<String>,
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveMessage {
    pub document_id: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitialStateMessage {
    #[serde_as(as = "Base64")]
    pub state: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "DOCUMENT_NOT_FOUND")]
    DocumentNotFound,
    #[serde(rename = "ACCESS_DENIED")]
    AccessDenied,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DocumentErrorMessage {
    pub error: String,
    pub code: ErrorCode,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// Events received from a client connection
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "joinDocumentRoom")]
    Join(JoinMessage),
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "awareness-update")]
    Awareness(AwarenessMessage),
    #[serde(rename = "updateTitle")]
    UpdateTitle(TitleMessage),
    #[serde(rename = "sendMessage")]
    SendMessage(ChatSendMessage),
    #[serde(rename = "leaveDocumentRoom")]
    Leave(LeaveMessage),
    #[serde(rename = "ping")]
    Ping,
}

/// Events emitted to client connections
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "documentError")]
    DocumentError(DocumentErrorMessage),
    #[serde(rename = "updateUsers")]
    UpdateUsers { users: Vec<Member> },
    #[serde(rename = "initialState")]
    InitialState(InitialStateMessage),
    #[serde(rename = "updateTitle")]
    UpdateTitle { title: String },
    #[serde(rename = "loadMessages")]
    LoadMessages { messages: Vec<ChatMessage> },
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "awareness-update")]
    Awareness { update: Value },
    #[serde(rename = "receiveMessage")]
    ReceiveMessage { message: ChatMessage },
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_event_parses_camel_case_fields() {
        let raw = r##"{"type":"joinDocumentRoom","documentId":"d1","username":"alice","colour":"#ff0000"}"##;
        match serde_json::from_str::<ClientEvent>(raw).unwrap() {
            ClientEvent::Join(msg) => {
                assert_eq!(msg.document_id, "d1");
                assert_eq!(msg.username, "alice");
                assert_eq!(msg.colour, "#ff0000");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn update_bytes_travel_base64() {
        let event = ServerEvent::Update(UpdateMessage {
            update: vec![1, 2, 3, 255],
        });
        let raw = serde_json::to_string(&event).unwrap();
        assert!(raw.contains(r#""type":"update""#));
        assert!(raw.contains("AQID/w=="));

        let back: ServerEvent = serde_json::from_str(&raw).unwrap();
        match back {
            ServerEvent::Update(msg) => assert_eq!(msg.update, vec![1, 2, 3, 255]),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn title_event_tolerates_missing_fields() {
        let raw = r#"{"type":"updateTitle","documentId":"d1"}"#;
        match serde_json::from_str::<ClientEvent>(raw).unwrap() {
            ClientEvent::UpdateTitle(msg) => {
                assert_eq!(msg.document_id.as_deref(), Some("d1"));
                assert!(msg.title.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn error_codes_serialize_screaming_snake() {
        let event = ServerEvent::DocumentError(DocumentErrorMessage {
            error: "Document not found".to_string(),
            code: ErrorCode::DocumentNotFound,
        });
        let raw = serde_json::to_string(&event).unwrap();
        assert!(raw.contains("DOCUMENT_NOT_FOUND"));
    }

    #[test]
    fn awareness_event_keeps_payload_opaque() {
        let raw = r#"{"type":"awareness-update","documentId":"d1","update":{"cursor":{"anchor":3}}}"#;
        match serde_json::from_str::<ClientEvent>(raw).unwrap() {
            ClientEvent::Awareness(msg) => {
                assert_eq!(msg.update["cursor"]["anchor"], 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
