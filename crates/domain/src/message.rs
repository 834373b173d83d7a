use crate::value_objects::Username;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    /// 服务端合成的消息（例如改名通知），客户端不能发送
    System,
}

/// 会话中的一条消息，追加后不可修改。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub sender: Username,
    pub text: String,
    /// `HH:MM`
    pub time: String,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
}

impl Message {
    pub fn new(
        sender: Username,
        text: impl Into<String>,
        message_type: MessageType,
        time: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            text: text.into(),
            time: time.into(),
            date: date.into(),
            message_type,
        }
    }
}
