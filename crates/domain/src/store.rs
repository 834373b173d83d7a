//! 持久化文档
//!
//! 整个存储就是一个文档：`users`（小写用户名 → 账户）和
//! `chats`（会话标识 → 按追加顺序排列的消息）。它是唯一的持久化单元。

use std::collections::BTreeMap;

use crate::message::Message;
use crate::user::User;
use crate::value_objects::{ChatKey, SessionId, Username};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Store {
    #[serde(default)]
    pub users: BTreeMap<Username, User>,
    #[serde(default)]
    pub chats: BTreeMap<ChatKey, Vec<Message>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, username: &Username) -> Option<&User> {
        self.users.get(username)
    }

    pub fn user_mut(&mut self, username: &Username) -> Option<&mut User> {
        self.users.get_mut(username)
    }

    /// 当前绑定到 `username` 的会话（仅在线用户才有）。
    pub fn session_of(&self, username: &Username) -> Option<SessionId> {
        self.users
            .get(username)
            .filter(|user| user.online)
            .and_then(|user| user.session_id)
    }

    /// 清除所有会话绑定和在线/输入状态。
    ///
    /// 进程重启后不存在任何存活的连接，加载时调用。
    pub fn reset_presence(&mut self) -> usize {
        let mut cleared = 0;
        for user in self.users.values_mut() {
            if user.online || user.session_id.is_some() || user.typing {
                user.clear_session();
                cleared += 1;
            }
        }
        cleared
    }
}
