use crate::value_objects::{Credential, DisplayName, SessionId};

/// 用户账户。用户名是存储中的键，因此不在实体内重复保存。
///
/// `online`/`typing` 是由会话派生的状态：只有绑定了会话才在线，
/// 只有在线时才可能处于输入中。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub display_name: DisplayName,
    pub credential: Credential,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub typing: bool,
}

impl User {
    pub fn register(display_name: DisplayName, credential: Credential, session: SessionId) -> Self {
        let mut user = Self {
            display_name,
            credential,
            session_id: None,
            online: false,
            typing: false,
        };
        user.bind_session(session);
        user
    }

    /// 绑定新的会话，旧会话（如果有）被直接替换。
    pub fn bind_session(&mut self, session: SessionId) {
        self.session_id = Some(session);
        self.online = true;
        self.typing = false;
    }

    pub fn clear_session(&mut self) {
        self.session_id = None;
        self.online = false;
        self.typing = false;
    }

    /// 设置输入状态；离线用户的输入状态始终为 false。
    pub fn set_typing(&mut self, typing: bool) {
        self.typing = typing && self.online;
    }

    pub fn rename(&mut self, display_name: DisplayName) {
        self.display_name = display_name;
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }

    pub fn is_bound_to(&self, session: SessionId) -> bool {
        self.session_id == Some(session)
    }
}
