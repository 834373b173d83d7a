use std::collections::BTreeMap;

use domain::{DisplayName, DomainError, SessionId, Store, User, Username};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApplicationError, events::UserStatusPayload, password::PasswordHasher,
    presence::PresenceTracker,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub username: String,
    pub password: String,
}

/// 对外可见的账户信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: Username,
    pub display_name: DisplayName,
}

/// 注册或登录成功后的结果：账户、要广播的在线状态，
/// 以及被顶替的旧会话（如果有）。
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub account: Account,
    pub status: UserStatusPayload,
    pub displaced: Option<SessionId>,
}

/// 账户注册表：注册、登录、资料和密码修改、查询。
pub struct UserRegistry<'a> {
    store: &'a mut Store,
    password_hasher: &'a dyn PasswordHasher,
}

impl<'a> UserRegistry<'a> {
    pub fn new(store: &'a mut Store, password_hasher: &'a dyn PasswordHasher) -> Self {
        Self {
            store,
            password_hasher,
        }
    }

    /// 创建账户并把请求所在的会话绑定上去。
    pub fn register(
        &mut self,
        request: RegisterUserRequest,
        session: SessionId,
    ) -> Result<Admission, ApplicationError> {
        let username = Username::parse(&request.username)?;
        let display_name = DisplayName::parse(&request.display_name)?;
        if request.password.is_empty() {
            return Err(DomainError::invalid_argument("password", "cannot be empty").into());
        }
        if self.store.users.contains_key(&username) {
            return Err(DomainError::DuplicateUsername.into());
        }

        let credential = self.password_hasher.hash(&request.password)?;
        self.store.users.insert(
            username.clone(),
            User::register(display_name.clone(), credential, session),
        );
        tracing::info!(username = %username, session_id = %session, "用户注册成功");

        let status = PresenceTracker::new(self.store).set_online(&username, session)?;
        Ok(Admission {
            account: Account {
                username,
                display_name,
            },
            status,
            displaced: None,
        })
    }

    /// 校验密码并把会话重新绑定到账户，之前的会话被静默顶替。
    pub fn login(
        &mut self,
        request: AuthenticateUserRequest,
        session: SessionId,
    ) -> Result<Admission, ApplicationError> {
        let username = Username::parse(&request.username).map_err(|_| DomainError::UnknownUser)?;
        let user = self
            .store
            .user(&username)
            .ok_or(DomainError::UnknownUser)?;

        if !self
            .password_hasher
            .verify(&request.password, &user.credential)?
        {
            return Err(DomainError::InvalidCredential.into());
        }

        let display_name = user.display_name.clone();
        let displaced = user.session_id.filter(|previous| *previous != session);

        let status = PresenceTracker::new(self.store).set_online(&username, session)?;
        tracing::info!(
            username = %username,
            session_id = %session,
            displaced = ?displaced,
            "用户登录成功"
        );

        Ok(Admission {
            account: Account {
                username,
                display_name,
            },
            status,
            displaced,
        })
    }

    /// 修改显示名，返回旧显示名和更新后的账户。
    pub fn update_display_name(
        &mut self,
        username: &Username,
        new_name: &str,
    ) -> Result<(DisplayName, Account), ApplicationError> {
        let display_name = DisplayName::parse(new_name)?;
        let user = self
            .store
            .user_mut(username)
            .ok_or(DomainError::UnknownUser)?;
        let previous = user.display_name.clone();
        user.rename(display_name.clone());

        Ok((
            previous,
            Account {
                username: username.clone(),
                display_name,
            },
        ))
    }

    pub fn update_password(
        &mut self,
        username: &Username,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ApplicationError> {
        if new_password.is_empty() {
            return Err(DomainError::invalid_argument("new_password", "cannot be empty").into());
        }
        let user = self
            .store
            .user(username)
            .ok_or(DomainError::UnknownUser)?;
        if !self.password_hasher.verify(old_password, &user.credential)? {
            return Err(DomainError::InvalidCredential.into());
        }

        let credential = self.password_hasher.hash(new_password)?;
        if let Some(user) = self.store.user_mut(username) {
            user.set_credential(credential);
        }
        Ok(())
    }

    pub fn username_exists(&self, username: &str) -> bool {
        Username::parse(username)
            .map(|username| self.store.users.contains_key(&username))
            .unwrap_or(false)
    }

    /// 不区分大小写地按用户名或显示名做子串匹配。
    pub fn search(&self, query: &str) -> BTreeMap<Username, DisplayName> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return BTreeMap::new();
        }

        self.store
            .users
            .iter()
            .filter(|(username, user)| {
                username.as_str().contains(&needle)
                    || user.display_name.as_str().to_lowercase().contains(&needle)
            })
            .map(|(username, user)| (username.clone(), user.display_name.clone()))
            .collect()
    }

    /// 所有用户的显示名
    pub fn display_names(&self) -> BTreeMap<Username, DisplayName> {
        self.store
            .users
            .iter()
            .map(|(username, user)| (username.clone(), user.display_name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::PasswordHasherError;
    use domain::Credential;

    struct ReversingHasher;

    impl PasswordHasher for ReversingHasher {
        fn hash(&self, plaintext: &str) -> Result<Credential, PasswordHasherError> {
            Credential::new(plaintext.chars().rev().collect::<String>())
                .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
        }
    }

    fn register(
        store: &mut Store,
        username: &str,
        display_name: &str,
        password: &str,
    ) -> Result<Admission, ApplicationError> {
        UserRegistry::new(store, &ReversingHasher).register(
            RegisterUserRequest {
                username: username.into(),
                display_name: display_name.into(),
                password: password.into(),
            },
            SessionId::new(),
        )
    }

    fn login(
        store: &mut Store,
        username: &str,
        password: &str,
        session: SessionId,
    ) -> Result<Admission, ApplicationError> {
        UserRegistry::new(store, &ReversingHasher).login(
            AuthenticateUserRequest {
                username: username.into(),
                password: password.into(),
            },
            session,
        )
    }

    #[test]
    fn duplicate_registration_keeps_first_account() {
        let mut store = Store::new();
        register(&mut store, "alice", "Alice", "pw1").unwrap();

        let result = register(&mut store, "ALICE", "Alice2", "pw2");
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::DuplicateUsername))
        ));

        let user = store.user(&Username::parse("alice").unwrap()).unwrap();
        assert_eq!(user.display_name.as_str(), "Alice");
        assert_eq!(user.credential.as_str(), "1wp");
    }

    #[test]
    fn registration_rejects_invalid_fields() {
        let mut store = Store::new();
        assert!(register(&mut store, "", "Alice", "pw").is_err());
        assert!(register(&mut store, "a__b", "Alice", "pw").is_err());
        assert!(register(&mut store, "alice", " ", "pw").is_err());
        assert!(register(&mut store, "alice", "Alice", "").is_err());
        assert!(store.users.is_empty());
    }

    #[test]
    fn login_distinguishes_unknown_user_and_bad_password() {
        let mut store = Store::new();
        register(&mut store, "alice", "Alice", "pw1").unwrap();

        let unknown = login(&mut store, "bob", "pw1", SessionId::new());
        assert!(matches!(
            unknown,
            Err(ApplicationError::Domain(DomainError::UnknownUser))
        ));

        let wrong = login(&mut store, "alice", "wrong", SessionId::new());
        assert!(matches!(
            wrong,
            Err(ApplicationError::Domain(DomainError::InvalidCredential))
        ));
    }

    #[test]
    fn login_reports_displaced_session() {
        let mut store = Store::new();
        let first = register(&mut store, "alice", "Alice", "pw1").unwrap();
        assert_eq!(first.displaced, None);
        let previous = store.session_of(&first.account.username).unwrap();

        let next = SessionId::new();
        let admission = login(&mut store, "Alice", "pw1", next).unwrap();
        assert_eq!(admission.displaced, Some(previous));
        assert_eq!(store.session_of(&admission.account.username), Some(next));
        assert!(admission.status.online);
    }

    #[test]
    fn password_update_swaps_credentials() {
        let mut store = Store::new();
        register(&mut store, "alice", "Alice", "pw1").unwrap();
        let alice = Username::parse("alice").unwrap();

        let mut registry = UserRegistry::new(&mut store, &ReversingHasher);
        assert!(matches!(
            registry.update_password(&alice, "nope", "pw2"),
            Err(ApplicationError::Domain(DomainError::InvalidCredential))
        ));
        registry.update_password(&alice, "pw1", "pw2").unwrap();

        assert!(login(&mut store, "alice", "pw2", SessionId::new()).is_ok());
        assert!(matches!(
            login(&mut store, "alice", "pw1", SessionId::new()),
            Err(ApplicationError::Domain(DomainError::InvalidCredential))
        ));
    }

    #[test]
    fn search_matches_username_or_display_name() {
        let mut store = Store::new();
        register(&mut store, "alice", "Wonderland", "pw").unwrap();
        register(&mut store, "bob", "Builder", "pw").unwrap();

        let registry = UserRegistry::new(&mut store, &ReversingHasher);
        let by_name = registry.search("ALI");
        assert_eq!(by_name.len(), 1);
        assert!(by_name.contains_key(&Username::parse("alice").unwrap()));

        let by_display = registry.search("build");
        assert!(by_display.contains_key(&Username::parse("bob").unwrap()));

        assert!(registry.search("   ").is_empty());
        assert!(registry.username_exists("Bob"));
        assert!(!registry.username_exists("carol"));
    }
}
