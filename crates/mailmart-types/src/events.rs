use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// One event delivered by the messaging bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbound {
    pub user_id: UserId,
    /// Display name shown in admin notifications.
    #[serde(default)]
    pub display_name: Option<String>,
    pub payload: InboundPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundPayload {
    /// Free text or a reply-keyboard button label.
    Text(String),

    /// A slash command such as `/start` or `/cancel`, without the slash.
    Command { name: String, args: Option<String> },

    /// Payload of a pressed inline button.
    Callback(String),
}

impl Inbound {
    pub fn text(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: None,
            payload: InboundPayload::Text(text.into()),
        }
    }

    pub fn command(user_id: UserId, name: impl Into<String>, args: Option<String>) -> Self {
        Self {
            user_id,
            display_name: None,
            payload: InboundPayload::Command {
                name: name.into(),
                args,
            },
        }
    }

    pub fn callback(user_id: UserId, data: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: None,
            payload: InboundPayload::Callback(data.into()),
        }
    }

    /// Name used when talking about this sender to someone else.
    pub fn sender_label(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{} (ID: {})", name, self.user_id),
            None => format!("ID: {}", self.user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

/// Keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum Keyboard {
    /// Persistent reply keyboard of button labels.
    Reply(Vec<Vec<String>>),
    /// One-shot reply keyboard hidden after a press.
    OneTime(Vec<Vec<String>>),
    /// Buttons attached to the message itself.
    Inline(Vec<Vec<InlineButton>>),
    /// Hide any reply keyboard.
    Remove,
}

/// A message for the bridge to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outgoing {
    pub chat_id: UserId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
}

impl Outgoing {
    pub fn new(chat_id: UserId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bridge_payloads_are_adjacently_tagged() {
        let inbound: Inbound = serde_json::from_value(json!({
            "user_id": 9,
            "payload": { "type": "Command", "data": { "name": "start", "args": "4" } }
        }))
        .unwrap();
        assert!(inbound.display_name.is_none());
        match inbound.payload {
            InboundPayload::Command { name, args } => {
                assert_eq!(name, "start");
                assert_eq!(args.as_deref(), Some("4"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn outgoing_omits_absent_keyboard() {
        let plain = serde_json::to_value(Outgoing::new(3, "hi")).unwrap();
        assert_eq!(plain, json!({ "chat_id": 3, "text": "hi" }));

        let inline = Outgoing::new(3, "review").with_keyboard(Keyboard::Inline(vec![vec![
            InlineButton {
                label: "Accept".into(),
                data: "accept_1".into(),
            },
        ]]));
        let value = serde_json::to_value(inline).unwrap();
        assert_eq!(value["keyboard"]["kind"], "inline");
        assert_eq!(value["keyboard"]["rows"][0][0]["data"], "accept_1");

        let remove = serde_json::to_value(Outgoing::new(3, "x").with_keyboard(Keyboard::Remove)).unwrap();
        assert_eq!(remove["keyboard"], json!({ "kind": "remove" }));
    }

    #[test]
    fn sender_label_prefers_display_name() {
        let mut inbound = Inbound::text(5, "hello");
        assert_eq!(inbound.sender_label(), "ID: 5");
        inbound.display_name = Some("Bea".into());
        assert_eq!(inbound.sender_label(), "Bea (ID: 5)");
    }
}
