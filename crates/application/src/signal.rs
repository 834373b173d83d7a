use domain::{Store, Username};
use serde_json::Value;

use crate::events::{Dispatch, RelayedSignalPayload, ServerEvent};

/// 信令转发：把不透明的协商数据原样交给在线的目标会话。
///
/// 目标离线时静默丢弃，不报错也不持久化。
pub struct SignalRelay<'a> {
    store: &'a Store,
}

impl<'a> SignalRelay<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn relay(&self, from: &Username, to: &Username, payload: Value) -> Option<Dispatch> {
        let Some(target) = self.store.session_of(to) else {
            tracing::debug!(from = %from, to = %to, "信令目标不在线，已丢弃");
            return None;
        };

        Some(Dispatch::new(
            target,
            ServerEvent::Signal(RelayedSignalPayload {
                from: from.clone(),
                payload,
            }),
        ))
    }
}
