// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send API request and response types.

use serde::{Deserialize, Serialize};

/// Body of `POST /{version}/me/messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub recipient: Recipient,
    pub messaging_type: &'static str,
    pub message: OutgoingMessage,
}

/// Page-scoped recipient id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub id: String,
}

/// Either plain text with optional quick replies, or a button template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        quick_replies: Vec<QuickReply>,
    },
    Attachment {
        attachment: Attachment,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickReply {
    pub content_type: &'static str,
    pub title: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub attachment_type: &'static str,
    pub payload: ButtonTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonTemplate {
    pub template_type: &'static str,
    pub text: String,
    pub buttons: Vec<TemplateButton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateButton {
    WebUrl { url: String, title: String },
    Postback { title: String, payload: String },
}

/// Successful Send API response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Graph API error envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphErrorResponse {
    pub error: GraphError,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
}
