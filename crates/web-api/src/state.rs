use std::sync::Arc;

use application::MessageRouter;
use domain::SessionId;
use tokio::sync::Mutex;

use crate::hub::ChatHub;

/// 所有连接共享的状态。
///
/// 路由器和出站队列放在同一把锁后面：事件逐个处理，
/// 出站事件在持锁期间入队，各接收方看到的顺序与处理顺序一致。
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Mutex<ChatHub>>,
}

impl AppState {
    pub fn new(router: MessageRouter) -> Self {
        Self {
            hub: Arc::new(Mutex::new(ChatHub::new(router))),
        }
    }

    /// 处理一帧入站文本。
    ///
    /// 拿到锁之后处理在独立任务中进行，调用方即使被中止，
    /// 修改、刷写和投递也会完整执行。锁在派生前获取，同一连接的帧保持顺序。
    pub async fn handle_frame(&self, session: SessionId, frame: String) {
        let mut hub = self.hub.clone().lock_owned().await;
        let task = tokio::spawn(async move { hub.handle_frame(session, &frame).await });
        if let Err(err) = task.await {
            tracing::error!(session_id = %session, error = %err, "入站帧处理任务异常结束");
        }
    }

    /// 断开处理，与 [`AppState::handle_frame`] 一样不会被中途取消。
    pub async fn disconnect(&self, session: SessionId) {
        let mut hub = self.hub.clone().lock_owned().await;
        let task = tokio::spawn(async move { hub.disconnect(session).await });
        if let Err(err) = task.await {
            tracing::error!(session_id = %session, error = %err, "断开处理任务异常结束");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use application::{
        repository::memory::MemoryStoreRepository, PasswordHasher, PasswordHasherError,
        RepositoryError, RouterDependencies, ServerEvent, StoreRepository, SystemClock,
    };
    use async_trait::async_trait;
    use domain::{Credential, Store, Username};
    use tokio::sync::mpsc;

    use super::*;

    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, plaintext: &str) -> Result<Credential, PasswordHasherError> {
            Credential::new(format!("plain:{plaintext}"))
                .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
        }
    }

    /// 开启 `slow` 后每次刷写先等待 300ms
    #[derive(Default)]
    struct SlowRepository {
        inner: MemoryStoreRepository,
        slow: AtomicBool,
    }

    #[async_trait]
    impl StoreRepository for SlowRepository {
        async fn load(&self) -> Result<Store, RepositoryError> {
            self.inner.load().await
        }

        async fn flush(&self, store: &Store) -> Result<(), RepositoryError> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            self.inner.flush(store).await
        }
    }

    fn register_frame(username: &str) -> String {
        format!(
            r#"{{"event":"register","data":{{"username":"{username}","display_name":"{username}","password":"pw"}}}}"#
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn aborted_caller_does_not_cut_frame_handling_short() {
        let repository = Arc::new(SlowRepository::default());
        let state = AppState::new(MessageRouter::new(
            Default::default(),
            RouterDependencies {
                repository: repository.clone(),
                password_hasher: Arc::new(PlainHasher),
                clock: Arc::new(SystemClock),
            },
        ));
        let (alice, bob) = (SessionId::new(), SessionId::new());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        {
            let mut hub = state.hub.lock().await;
            hub.connect(alice, tx_a);
            hub.connect(bob, tx_b);
        }
        state.handle_frame(alice, register_frame("alice")).await;
        state.handle_frame(bob, register_frame("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        repository.slow.store(true, Ordering::SeqCst);
        let caller = {
            let state = state.clone();
            tokio::spawn(async move {
                let frame = r#"{"event":"send_message","data":{"from":"alice","to":"bob","text":"hi"}}"#;
                state.handle_frame(alice, frame.to_string()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();

        // 断开排在被中止的那一帧之后
        state.disconnect(alice).await;

        let persisted = repository.inner.snapshot().await.expect("flushed");
        assert_eq!(persisted.chats.values().map(Vec::len).sum::<usize>(), 1);
        assert_eq!(drain(&mut rx_b), vec!["new_message", "user_status"]);
        let hub = state.hub.lock().await;
        assert!(!hub.router().is_dirty());
        let account = hub
            .router()
            .store()
            .user(&Username::parse("alice").unwrap())
            .expect("alice account kept");
        assert!(!account.online);
    }
}
