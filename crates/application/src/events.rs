//! 线上事件定义
//!
//! 每一帧都是 `{"event": "<名称>", "data": {...}}`。入站事件在边界处
//! 解析成 [`ClientEvent`]，字段缺失或形状错误的帧在触及存储前就被拒绝。

use std::collections::BTreeMap;

use domain::{ChatKey, DisplayName, Message, MessageType, SessionId, Username};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApplicationError;
use crate::services::Account;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProfilePayload {
    pub username: String,
    pub new_display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePasswordPayload {
    pub username: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckUsernamePayload {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTypingPayload {
    pub from: String,
    pub to: String,
    pub typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub from: String,
    pub to: String,
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

/// 搜索词既可以是裸字符串，也可以是 `{"query": "..."}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchUserPayload {
    Query { query: String },
    Bare(String),
}

impl SearchUserPayload {
    pub fn query(&self) -> &str {
        match self {
            SearchUserPayload::Query { query } => query,
            SearchUserPayload::Bare(query) => query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub from: String,
    pub to: String,
    /// 不透明的协商数据，服务端原样转发
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetUserStatusesPayload {
    pub current_user: String,
}

/// 客户端发来的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Register(RegisterPayload),
    Login(LoginPayload),
    UpdateProfile(UpdateProfilePayload),
    UpdatePassword(UpdatePasswordPayload),
    CheckUsername(CheckUsernamePayload),
    UserTyping(UserTypingPayload),
    SendMessage(SendMessagePayload),
    SearchUser(SearchUserPayload),
    Signal(SignalPayload),
    GetUserStatuses(GetUserStatusesPayload),
}

impl ClientEvent {
    /// 解析一帧文本；任何形状错误都归为 `MalformedEvent`。
    pub fn from_frame(frame: &str) -> Result<Self, ApplicationError> {
        serde_json::from_str(frame).map_err(|err| ApplicationError::malformed(err.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Register(_) => "register",
            ClientEvent::Login(_) => "login",
            ClientEvent::UpdateProfile(_) => "update_profile",
            ClientEvent::UpdatePassword(_) => "update_password",
            ClientEvent::CheckUsername(_) => "check_username",
            ClientEvent::UserTyping(_) => "user_typing",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::SearchUser(_) => "search_user",
            ClientEvent::Signal(_) => "signal",
            ClientEvent::GetUserStatuses(_) => "get_user_statuses",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSuccessPayload {
    pub chats: BTreeMap<ChatKey, Vec<Message>>,
    pub names: BTreeMap<Username, DisplayName>,
    pub current_user: Username,
}

/// 在线状态变化通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatusPayload {
    pub username: Username,
    pub online: bool,
    pub typing: bool,
}

/// 单个用户的在线状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub online: bool,
    pub typing: bool,
    pub display_name: DisplayName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    pub chat_id: ChatKey,
    pub msg: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsernameCheckPayload {
    pub exists: bool,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTypingStatusPayload {
    pub from: Username,
    pub typing: bool,
    pub display_name: DisplayName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedSignalPayload {
    pub from: Username,
    pub payload: Value,
}

/// 服务端发出的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    RegisterSuccess(Account),
    RegisterError(ErrorPayload),
    LoginError(ErrorPayload),
    AuthSuccess(AuthSuccessPayload),
    UserStatus(UserStatusPayload),
    GlobalUserUpdate(Account),
    NewMessage(NewMessagePayload),
    PasswordUpdateSuccess {},
    PasswordUpdateError(ErrorPayload),
    UsernameCheck(UsernameCheckPayload),
    UserTypingStatus(UserTypingStatusPayload),
    SearchResults(BTreeMap<Username, DisplayName>),
    Signal(RelayedSignalPayload),
    UserStatuses(BTreeMap<Username, PresenceStatus>),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RegisterSuccess(_) => "register_success",
            ServerEvent::RegisterError(_) => "register_error",
            ServerEvent::LoginError(_) => "login_error",
            ServerEvent::AuthSuccess(_) => "auth_success",
            ServerEvent::UserStatus(_) => "user_status",
            ServerEvent::GlobalUserUpdate(_) => "global_user_update",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::PasswordUpdateSuccess {} => "password_update_success",
            ServerEvent::PasswordUpdateError(_) => "password_update_error",
            ServerEvent::UsernameCheck(_) => "username_check",
            ServerEvent::UserTypingStatus(_) => "user_typing_status",
            ServerEvent::SearchResults(_) => "search_results",
            ServerEvent::Signal(_) => "signal",
            ServerEvent::UserStatuses(_) => "user_statuses",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload::new(message))
    }
}

/// 投递给某个连接会话的一个出站事件
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub target: SessionId,
    pub event: ServerEvent,
}

impl Dispatch {
    pub fn new(target: SessionId, event: ServerEvent) -> Self {
        Self { target, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_frames() {
        let frame = json!({
            "event": "send_message",
            "data": {"from": "alice", "to": "bob", "text": "hi"}
        })
        .to_string();
        let event = ClientEvent::from_frame(&frame).unwrap();
        match event {
            ClientEvent::SendMessage(payload) => {
                assert_eq!(payload.text, "hi");
                assert_eq!(payload.message_type, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn search_accepts_bare_string_and_object() {
        let bare = ClientEvent::from_frame(r#"{"event":"search_user","data":"Al"}"#).unwrap();
        let object =
            ClientEvent::from_frame(r#"{"event":"search_user","data":{"query":"Al"}}"#).unwrap();
        for event in [bare, object] {
            match event {
                ClientEvent::SearchUser(payload) => assert_eq!(payload.query(), "Al"),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_missing_fields_and_unknown_events() {
        let missing = ClientEvent::from_frame(r#"{"event":"login","data":{"username":"a"}}"#);
        assert!(matches!(missing, Err(ApplicationError::MalformedEvent(_))));

        let unknown = ClientEvent::from_frame(r#"{"event":"explode","data":{}}"#);
        assert!(matches!(unknown, Err(ApplicationError::MalformedEvent(_))));

        let garbage = ClientEvent::from_frame("not json");
        assert!(matches!(garbage, Err(ApplicationError::MalformedEvent(_))));
    }

    #[test]
    fn server_events_use_wire_names() {
        let frame = ServerEvent::PasswordUpdateSuccess {}.to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "password_update_success");
        assert_eq!(value["data"], json!({}));

        let frame = ServerEvent::error("boom").to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "error", "data": {"message": "boom"}}));
    }
}
