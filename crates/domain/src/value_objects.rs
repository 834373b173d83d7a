use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 用户名和显示名的最大长度。
pub const MAX_NAME_LENGTH: usize = 50;

/// 会话标识中两个用户名之间的分隔符。
pub const CHAT_KEY_SEPARATOR: &str = "__";

/// 连接会话唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// 经过规范化的用户名（去除首尾空白并转为小写）。
///
/// 用户名不能包含 `__`，也不能以 `_` 开头或结尾，
/// 这样 [`ChatKey`] 总能被唯一地拆回两个用户名。
/// 反序列化同样经过 [`Username::parse`]，持久化文档中的键也会被规范化。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let value = value.as_ref().trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("username", "cannot be empty"));
        }
        if value.chars().count() > MAX_NAME_LENGTH {
            return Err(DomainError::invalid_argument("username", "too long"));
        }
        if value.contains(CHAT_KEY_SEPARATOR) || value.starts_with('_') || value.ends_with('_') {
            return Err(DomainError::invalid_argument(
                "username",
                "cannot contain '__' or start/end with '_'",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过验证的显示名，允许重复。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let value = value.as_ref().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("display_name", "cannot be empty"));
        }
        if value.chars().count() > MAX_NAME_LENGTH {
            return Err(DomainError::invalid_argument("display_name", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DisplayName> for String {
    fn from(value: DisplayName) -> Self {
        value.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 由密码单向派生出的凭据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("credential", "cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 两人会话的规范标识：两个用户名按字典序排序后用 `__` 连接。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChatKey(String);

impl ChatKey {
    /// 解析已有的标识，两个参与者都必须是合法用户名；结果总是规范顺序。
    pub fn parse(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let invalid = || DomainError::invalid_argument("chat_id", "expected '<user>__<user>'");
        let (first, second) = value
            .as_ref()
            .split_once(CHAT_KEY_SEPARATOR)
            .ok_or_else(invalid)?;
        let first = Username::parse(first).map_err(|_| invalid())?;
        let second = Username::parse(second).map_err(|_| invalid())?;
        Ok(Self::between(&first, &second))
    }

    pub fn between(a: &Username, b: &Username) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{CHAT_KEY_SEPARATOR}{second}"))
    }

    /// 把标识拆回两个参与者；无法拆分的标识返回 `None`。
    pub fn participants(&self) -> Option<(Username, Username)> {
        let (first, second) = self.0.split_once(CHAT_KEY_SEPARATOR)?;
        Some((Username::parse(first).ok()?, Username::parse(second).ok()?))
    }

    pub fn involves(&self, username: &Username) -> bool {
        self.participants()
            .map(|(a, b)| &a == username || &b == username)
            .unwrap_or(false)
    }

    /// 返回会话中除 `username` 之外的另一方。
    pub fn partner_of(&self, username: &Username) -> Option<Username> {
        let (a, b) = self.participants()?;
        if &a == username {
            Some(b)
        } else if &b == username {
            Some(a)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChatKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ChatKey> for String {
    fn from(value: ChatKey) -> Self {
        value.0
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
