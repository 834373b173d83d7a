mod chat_store;
mod user_registry;

pub use chat_store::ChatStore;
pub use user_registry::{
    Account, Admission, AuthenticateUserRequest, RegisterUserRequest, UserRegistry,
};
