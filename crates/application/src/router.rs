//! 消息路由器
//!
//! 拥有唯一的内存存储文档，逐个处理入站事件：校验、调用各组件、
//! 在修改后整体刷写持久化，并计算每个出站事件应该投递给哪些会话。
//!
//! 每个连接的状态机：`Unauthenticated → Authenticated → Closed`。
//! 未认证时只接受 `register` 和 `login`。

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{DomainError, Message, MessageType, SessionId, Store, Username};

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::{
        AuthSuccessPayload, ClientEvent, Dispatch, ErrorPayload, GetUserStatusesPayload,
        LoginPayload, NewMessagePayload, RegisterPayload, SendMessagePayload, ServerEvent,
        SignalPayload, UpdatePasswordPayload, UpdateProfilePayload, UserTypingPayload,
        UsernameCheckPayload,
    },
    password::PasswordHasher,
    presence::PresenceTracker,
    repository::StoreRepository,
    services::{Admission, AuthenticateUserRequest, ChatStore, RegisterUserRequest, UserRegistry},
    signal::SignalRelay,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated(Username),
    Closed,
}

pub struct RouterDependencies {
    pub repository: Arc<dyn StoreRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

/// 单次事件处理中累积的出站事件，按入队顺序投递。
#[derive(Debug, Default)]
struct Outbox {
    dispatches: Vec<Dispatch>,
}

impl Outbox {
    fn to(&mut self, target: SessionId, event: ServerEvent) {
        self.dispatches.push(Dispatch::new(target, event));
    }

    fn push(&mut self, dispatch: Dispatch) {
        self.dispatches.push(dispatch);
    }
}

pub struct MessageRouter {
    store: Store,
    connections: BTreeMap<SessionId, ConnectionState>,
    deps: RouterDependencies,
    dirty: bool,
}

impl MessageRouter {
    pub fn new(store: Store, deps: RouterDependencies) -> Self {
        Self {
            store,
            connections: BTreeMap::new(),
            deps,
            dirty: false,
        }
    }

    /// 从持久化仓库加载存储。重启后没有存活的会话，所有在线状态被清空。
    pub async fn load(deps: RouterDependencies) -> Result<Self, ApplicationError> {
        let mut store = deps.repository.load().await?;
        let cleared = store.reset_presence();
        tracing::info!(
            users = store.users.len(),
            chats = store.chats.len(),
            stale_sessions = cleared,
            "存储加载完成"
        );
        Ok(Self::new(store, deps))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// 最近一次刷写是否失败或未完成（内存中有尚未落盘的修改）
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn connection_state(&self, session: SessionId) -> ConnectionState {
        self.connections
            .get(&session)
            .cloned()
            .unwrap_or(ConnectionState::Closed)
    }

    /// 新连接以未认证状态加入，开始接收全局广播。
    pub fn connect(&mut self, session: SessionId) {
        tracing::info!(session_id = %session, "连接已建立");
        self.connections
            .insert(session, ConnectionState::Unauthenticated);
    }

    /// 解析一帧文本并处理；格式错误只回一条 `error` 给发送方。
    pub async fn handle_frame(&mut self, session: SessionId, frame: &str) -> Vec<Dispatch> {
        if !self.connections.contains_key(&session) {
            tracing::warn!(session_id = %session, "忽略已关闭连接的事件");
            return Vec::new();
        }
        match ClientEvent::from_frame(frame) {
            Ok(event) => self.handle_event(session, event).await,
            Err(err) => {
                tracing::warn!(session_id = %session, error = %err, "拒绝格式错误的事件");
                vec![Dispatch::new(session, ServerEvent::error(err.to_string()))]
            }
        }
    }

    pub async fn handle_event(&mut self, session: SessionId, event: ClientEvent) -> Vec<Dispatch> {
        let state = self.connection_state(session);
        let name = event.name();
        let mut outbox = Outbox::default();

        let result = match (state, event) {
            (ConnectionState::Closed, _) => {
                tracing::warn!(session_id = %session, event = name, "忽略已关闭连接的事件");
                return Vec::new();
            }
            (state, ClientEvent::Register(payload)) => {
                self.on_register(session, &state, payload, &mut outbox)
                    .await
            }
            (state, ClientEvent::Login(payload)) => {
                self.on_login(session, &state, payload, &mut outbox).await
            }
            (ConnectionState::Unauthenticated, _) => Err(ApplicationError::NotAuthenticated),
            (ConnectionState::Authenticated(user), event) => {
                self.dispatch_authenticated(session, user, event, &mut outbox)
                    .await
            }
        };

        if let Err(err) = result {
            tracing::debug!(session_id = %session, event = name, error = %err, "事件处理失败");
            outbox.to(session, Self::error_event(name, &err));
        }
        outbox.dispatches
    }

    /// 连接断开：只清除会话关联和在线标志，账户和会话历史保持不变。
    pub async fn disconnect(&mut self, session: SessionId) -> Vec<Dispatch> {
        let mut outbox = Outbox::default();
        let Some(state) = self.connections.remove(&session) else {
            return Vec::new();
        };
        tracing::info!(session_id = %session, "连接已关闭");

        let ConnectionState::Authenticated(username) = state else {
            return Vec::new();
        };
        let still_bound = self
            .store
            .user(&username)
            .map(|user| user.is_bound_to(session))
            .unwrap_or(false);
        if !still_bound {
            tracing::debug!(username = %username, session_id = %session, "被顶替的会话断开，在线状态不变");
            return Vec::new();
        }

        if let Some(status) = PresenceTracker::new(&mut self.store).set_offline(&username) {
            self.broadcast(&mut outbox, ServerEvent::UserStatus(status));
        }
        if let Err(err) = self.flush().await {
            tracing::error!(error = %err, username = %username, "断开连接后刷写存储失败");
        }
        outbox.dispatches
    }

    /// 优雅关闭时把最终状态写回持久化。
    pub async fn shutdown(&mut self) -> Result<(), ApplicationError> {
        let usernames: Vec<Username> = self
            .connections
            .values()
            .filter_map(|state| match state {
                ConnectionState::Authenticated(username) => Some(username.clone()),
                _ => None,
            })
            .collect();
        for username in usernames {
            PresenceTracker::new(&mut self.store).set_offline(&username);
        }
        self.connections.clear();
        self.flush().await
    }

    async fn dispatch_authenticated(
        &mut self,
        session: SessionId,
        user: Username,
        event: ClientEvent,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        match event {
            ClientEvent::UpdateProfile(payload) => {
                self.on_update_profile(session, &user, payload, outbox)
                    .await
            }
            ClientEvent::UpdatePassword(payload) => {
                self.on_update_password(session, &user, payload, outbox)
                    .await
            }
            ClientEvent::CheckUsername(payload) => {
                let exists = self.registry().username_exists(&payload.username);
                outbox.to(
                    session,
                    ServerEvent::UsernameCheck(UsernameCheckPayload {
                        exists,
                        username: payload.username,
                    }),
                );
                Ok(())
            }
            ClientEvent::UserTyping(payload) => self.on_user_typing(&user, payload, outbox),
            ClientEvent::SendMessage(payload) => {
                self.on_send_message(session, &user, payload, outbox)
                    .await
            }
            ClientEvent::SearchUser(payload) => {
                let results = self.registry().search(payload.query());
                outbox.to(session, ServerEvent::SearchResults(results));
                Ok(())
            }
            ClientEvent::Signal(payload) => self.on_signal(&user, payload, outbox),
            ClientEvent::GetUserStatuses(GetUserStatusesPayload { current_user }) => {
                Self::ensure_self(&user, &current_user, "current_user")?;
                let statuses = PresenceTracker::new(&mut self.store).statuses_except(&user);
                outbox.to(session, ServerEvent::UserStatuses(statuses));
                Ok(())
            }
            ClientEvent::Register(_) | ClientEvent::Login(_) => Ok(()),
        }
    }

    async fn on_register(
        &mut self,
        session: SessionId,
        state: &ConnectionState,
        payload: RegisterPayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        let RegisterPayload {
            username,
            display_name,
            password,
        } = payload;
        let admission = self.registry().register(
            RegisterUserRequest {
                username,
                display_name,
                password,
            },
            session,
        )?;

        outbox.to(session, ServerEvent::RegisterSuccess(admission.account.clone()));
        self.admit(session, state, admission, outbox).await;
        Ok(())
    }

    async fn on_login(
        &mut self,
        session: SessionId,
        state: &ConnectionState,
        payload: LoginPayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        let LoginPayload { username, password } = payload;
        let admission = self
            .registry()
            .login(AuthenticateUserRequest { username, password }, session)?;

        self.admit(session, state, admission, outbox).await;
        Ok(())
    }

    /// 注册/登录成功后的公共流程：处理旧绑定、刷写、广播在线状态、发送初始视图。
    async fn admit(
        &mut self,
        session: SessionId,
        state: &ConnectionState,
        admission: Admission,
        outbox: &mut Outbox,
    ) {
        let Admission {
            account,
            status,
            displaced,
        } = admission;
        let username = account.username;

        // 同一连接之前登录的是另一个账户：那个账户随之离线
        if let ConnectionState::Authenticated(previous) = state {
            if *previous != username {
                self.release(previous, session, outbox);
            }
        }

        // 同一账户的旧连接被静默降级，不通知
        if let Some(displaced) = displaced {
            if let Some(entry) = self.connections.get_mut(&displaced) {
                *entry = ConnectionState::Unauthenticated;
                tracing::info!(username = %username, session_id = %displaced, "旧会话已被新登录顶替");
            }
        }
        self.connections
            .insert(session, ConnectionState::Authenticated(username.clone()));

        self.flush_or_report(session, outbox).await;
        self.broadcast(outbox, ServerEvent::UserStatus(status));

        let chats = ChatStore::new(&mut self.store).chats_for(&username);
        let names = self.registry().display_names();
        outbox.to(
            session,
            ServerEvent::AuthSuccess(AuthSuccessPayload {
                chats,
                names,
                current_user: username,
            }),
        );
    }

    /// 让 `username` 离开 `session`，仅当该会话仍是其当前绑定时才离线并广播。
    fn release(&mut self, username: &Username, session: SessionId, outbox: &mut Outbox) {
        let bound = self
            .store
            .user(username)
            .map(|user| user.is_bound_to(session))
            .unwrap_or(false);
        if !bound {
            return;
        }
        if let Some(status) = PresenceTracker::new(&mut self.store).set_offline(username) {
            self.broadcast(outbox, ServerEvent::UserStatus(status));
        }
    }

    async fn on_update_profile(
        &mut self,
        session: SessionId,
        user: &Username,
        payload: UpdateProfilePayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        Self::ensure_self(user, &payload.username, "username")?;
        let (previous, account) = self
            .registry()
            .update_display_name(user, &payload.new_display_name)?;
        self.broadcast(outbox, ServerEvent::GlobalUserUpdate(account.clone()));

        let text = format!(
            "{} changed their name to {}",
            previous, account.display_name
        );
        let notice = Message::new(
            user.clone(),
            text,
            MessageType::System,
            self.deps.clock.time_of_day(),
            self.deps.clock.date(),
        );

        let mut chats = ChatStore::new(&mut self.store);
        let partners = chats.partners_of(user);
        for (key, _) in &partners {
            chats.append_to(key, notice.clone());
        }

        for (key, partner) in partners {
            let event = ServerEvent::NewMessage(NewMessagePayload {
                chat_id: key,
                msg: notice.clone(),
            });
            let mut targets: Vec<SessionId> = [user, &partner]
                .into_iter()
                .filter_map(|participant| self.store.session_of(participant))
                .collect();
            targets.dedup();
            for target in targets {
                outbox.to(target, event.clone());
            }
        }

        self.flush_or_report(session, outbox).await;
        Ok(())
    }

    async fn on_update_password(
        &mut self,
        session: SessionId,
        user: &Username,
        payload: UpdatePasswordPayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        Self::ensure_self(user, &payload.username, "username")?;
        self.registry()
            .update_password(user, &payload.old_password, &payload.new_password)?;

        self.flush_or_report(session, outbox).await;
        outbox.to(session, ServerEvent::PasswordUpdateSuccess {});
        Ok(())
    }

    fn on_user_typing(
        &mut self,
        user: &Username,
        payload: UserTypingPayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        Self::ensure_self(user, &payload.from, "from")?;
        let to = Self::parse_peer(&payload.to)?;
        if let Some(dispatch) =
            PresenceTracker::new(&mut self.store).set_typing(user, &to, payload.typing)
        {
            outbox.push(dispatch);
        }
        Ok(())
    }

    async fn on_send_message(
        &mut self,
        session: SessionId,
        user: &Username,
        payload: SendMessagePayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        Self::ensure_self(user, &payload.from, "from")?;
        let to = Self::parse_peer(&payload.to)?;
        if self.store.user(&to).is_none() {
            return Err(DomainError::UnknownUser.into());
        }
        if payload.text.trim().is_empty() {
            return Err(ApplicationError::malformed("text cannot be empty"));
        }
        let message_type = payload.message_type.unwrap_or_default();
        if message_type == MessageType::System {
            return Err(ApplicationError::malformed(
                "system messages cannot be sent by clients",
            ));
        }

        let message = Message::new(
            user.clone(),
            payload.text,
            message_type,
            self.deps.clock.time_of_day(),
            self.deps.clock.date(),
        );
        let chat_id = ChatStore::new(&mut self.store).append(user, &to, message.clone());

        let mut presence = PresenceTracker::new(&mut self.store);
        if presence.is_typing(user) {
            if let Some(dispatch) = presence.set_typing(user, &to, false) {
                outbox.push(dispatch);
            }
        }

        self.flush_or_report(session, outbox).await;

        let event = ServerEvent::NewMessage(NewMessagePayload {
            chat_id,
            msg: message,
        });
        outbox.to(session, event.clone());
        if let Some(target) = self.store.session_of(&to) {
            if target != session {
                outbox.to(target, event);
            }
        }
        Ok(())
    }

    fn on_signal(
        &mut self,
        user: &Username,
        payload: SignalPayload,
        outbox: &mut Outbox,
    ) -> Result<(), ApplicationError> {
        Self::ensure_self(user, &payload.from, "from")?;
        let to = Self::parse_peer(&payload.to)?;
        if let Some(dispatch) = SignalRelay::new(&self.store).relay(user, &to, payload.payload) {
            outbox.push(dispatch);
        }
        Ok(())
    }

    fn registry(&mut self) -> UserRegistry<'_> {
        UserRegistry::new(&mut self.store, self.deps.password_hasher.as_ref())
    }

    /// 给所有存活连接（任意未关闭状态）入队同一个事件。
    fn broadcast(&self, outbox: &mut Outbox, event: ServerEvent) {
        for session in self.connections.keys() {
            outbox.to(*session, event.clone());
        }
    }

    /// 刷写前先标记为脏，只有写入成功才清除；刷写被取消时存储仍保持脏状态。
    async fn flush(&mut self) -> Result<(), ApplicationError> {
        let was_dirty = std::mem::replace(&mut self.dirty, true);
        self.deps.repository.flush(&self.store).await?;
        if was_dirty {
            tracing::info!("存储刷写恢复正常");
        }
        self.dirty = false;
        Ok(())
    }

    /// 刷写失败时内存修改已生效：标记为脏、继续服务，并告知发起方。
    async fn flush_or_report(&mut self, session: SessionId, outbox: &mut Outbox) {
        if let Err(err) = self.flush().await {
            tracing::error!(session_id = %session, error = %err, "刷写存储失败，继续使用内存状态");
            outbox.to(session, ServerEvent::error(err.to_string()));
        }
    }

    /// 载荷中的身份字段必须是当前会话自己的用户。
    fn ensure_self(user: &Username, claimed: &str, field: &str) -> Result<(), ApplicationError> {
        match Username::parse(claimed) {
            Ok(claimed) if claimed == *user => Ok(()),
            _ => Err(ApplicationError::malformed(format!(
                "{field} does not match the authenticated user"
            ))),
        }
    }

    fn parse_peer(value: &str) -> Result<Username, ApplicationError> {
        Username::parse(value).map_err(|err| ApplicationError::malformed(err.to_string()))
    }

    fn error_event(event_name: &str, err: &ApplicationError) -> ServerEvent {
        let payload = ErrorPayload::new(err.to_string());
        match (event_name, err) {
            ("register", ApplicationError::Domain(_)) => ServerEvent::RegisterError(payload),
            ("login", ApplicationError::Domain(_)) => ServerEvent::LoginError(payload),
            ("update_password", ApplicationError::Domain(_)) => {
                ServerEvent::PasswordUpdateError(payload)
            }
            _ => ServerEvent::Error(payload),
        }
    }
}
