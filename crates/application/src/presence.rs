use std::collections::BTreeMap;

use domain::{DomainError, SessionId, Store, Username};

use crate::error::ApplicationError;
use crate::events::{
    Dispatch, PresenceStatus, ServerEvent, UserStatusPayload, UserTypingStatusPayload,
};

/// 在线状态跟踪器
///
/// 在线/输入标志直接保存在账户上，由会话绑定派生。
/// 状态变化以返回值的形式交给路由器广播，本组件自身从不持久化。
pub struct PresenceTracker<'a> {
    store: &'a mut Store,
}

impl<'a> PresenceTracker<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// 绑定会话并标记在线，返回需要广播给所有连接的状态。
    pub fn set_online(
        &mut self,
        username: &Username,
        session: SessionId,
    ) -> Result<UserStatusPayload, ApplicationError> {
        let user = self
            .store
            .user_mut(username)
            .ok_or(DomainError::UnknownUser)?;
        user.bind_session(session);

        tracing::debug!(username = %username, session_id = %session, "用户上线");
        Ok(UserStatusPayload {
            username: username.clone(),
            online: true,
            typing: false,
        })
    }

    /// 清除会话绑定，同时强制 typing=false。
    pub fn set_offline(&mut self, username: &Username) -> Option<UserStatusPayload> {
        let user = self.store.user_mut(username)?;
        user.clear_session();

        tracing::debug!(username = %username, "用户离线");
        Some(UserStatusPayload {
            username: username.clone(),
            online: false,
            typing: false,
        })
    }

    /// 更新输入状态；对方在线时只给对方发一条定向通知，不做全局广播。
    pub fn set_typing(&mut self, from: &Username, to: &Username, typing: bool) -> Option<Dispatch> {
        let user = self.store.user_mut(from)?;
        user.set_typing(typing);
        let payload = UserTypingStatusPayload {
            from: from.clone(),
            typing: user.typing,
            display_name: user.display_name.clone(),
        };

        let target = self.store.session_of(to)?;
        Some(Dispatch::new(target, ServerEvent::UserTypingStatus(payload)))
    }

    pub fn is_typing(&self, username: &Username) -> bool {
        self.store
            .user(username)
            .map(|user| user.typing)
            .unwrap_or(false)
    }

    /// 除 `username` 之外所有用户的在线状态快照
    pub fn statuses_except(&self, username: &Username) -> BTreeMap<Username, PresenceStatus> {
        self.store
            .users
            .iter()
            .filter(|(name, _)| *name != username)
            .map(|(name, user)| {
                (
                    name.clone(),
                    PresenceStatus {
                        online: user.online,
                        typing: user.typing,
                        display_name: user.display_name.clone(),
                    },
                )
            })
            .collect()
    }
}
