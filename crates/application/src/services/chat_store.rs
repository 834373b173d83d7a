use std::collections::BTreeMap;

use domain::{ChatKey, Message, Store, Username};

/// 两人会话的消息存储，按规范会话标识索引，只追加。
pub struct ChatStore<'a> {
    store: &'a mut Store,
}

impl<'a> ChatStore<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// 与消息方向无关的会话标识
    pub fn chat_key(a: &Username, b: &Username) -> ChatKey {
        ChatKey::between(a, b)
    }

    /// 追加一条消息，会话不存在时惰性创建。
    pub fn append(&mut self, a: &Username, b: &Username, message: Message) -> ChatKey {
        let key = Self::chat_key(a, b);
        self.store
            .chats
            .entry(key.clone())
            .or_default()
            .push(message);
        key
    }

    /// 追加到已知标识的会话
    pub fn append_to(&mut self, key: &ChatKey, message: Message) {
        self.store
            .chats
            .entry(key.clone())
            .or_default()
            .push(message);
    }

    /// `username` 参与的所有会话及其完整历史。
    pub fn chats_for(&self, username: &Username) -> BTreeMap<ChatKey, Vec<Message>> {
        self.store
            .chats
            .iter()
            .filter(|(key, _)| key.involves(username))
            .map(|(key, messages)| (key.clone(), messages.clone()))
            .collect()
    }

    /// `username` 参与的每个会话以及会话的另一方。
    pub fn partners_of(&self, username: &Username) -> Vec<(ChatKey, Username)> {
        self.store
            .chats
            .keys()
            .filter_map(|key| {
                key.partner_of(username)
                    .map(|partner| (key.clone(), partner))
            })
            .collect()
    }
}
