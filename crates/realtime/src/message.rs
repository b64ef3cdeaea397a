use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One JSON frame on the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketFrame {
    pub message: String,
    /// Feature-specific fields (sender, timestamps, output streams...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SocketFrame {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_keeps_extra_fields() {
        let frame: SocketFrame =
            serde_json::from_value(json!({ "message": "hello", "sender": "jdoe" })).unwrap();

        assert_eq!(frame.message, "hello");
        assert_eq!(frame.get("sender"), Some(&json!("jdoe")));
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "message": "hello", "sender": "jdoe" })
        );
    }
}
