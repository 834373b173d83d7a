use application::StoreRepository;
use domain::{
    ChatKey, Credential, DisplayName, Message, MessageType, SessionId, Store, User, Username,
};
use infrastructure::JsonFileStoreRepository;

fn sample_store() -> Store {
    let alice = Username::parse("alice").unwrap();
    let bob = Username::parse("bob").unwrap();
    let mut store = Store::new();
    store.users.insert(
        alice.clone(),
        User::register(
            DisplayName::parse("Alice").unwrap(),
            Credential::new("ba7816bf").unwrap(),
            SessionId::new(),
        ),
    );
    store.chats.insert(
        ChatKey::between(&alice, &bob),
        vec![Message::new(
            alice,
            "hi",
            MessageType::Text,
            "10:00",
            "2024-01-01",
        )],
    );
    store
}

#[tokio::test]
async fn missing_file_loads_as_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let repository = JsonFileStoreRepository::new(dir.path().join("chat_data.json"), true);

    let store = repository.load().await.unwrap();
    assert!(store.users.is_empty());
    assert!(store.chats.is_empty());
}

#[tokio::test]
async fn flush_then_load_restores_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("chat_data.json");
    let repository = JsonFileStoreRepository::new(&path, true);
    let store = sample_store();

    repository.flush(&store).await.unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("nested").join("chat_data.json.tmp").exists());

    let reloaded = JsonFileStoreRepository::new(&path, true).load().await.unwrap();
    assert_eq!(reloaded, store);
}

#[tokio::test]
async fn persisted_layout_uses_lowercase_keys_and_chat_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_data.json");
    let repository = JsonFileStoreRepository::new(&path, false);
    repository.flush(&sample_store()).await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["users"]["alice"]["display_name"], "Alice");
    assert_eq!(value["users"]["alice"]["credential"], "ba7816bf");
    assert_eq!(value["chats"]["alice__bob"][0]["text"], "hi");
    assert_eq!(value["chats"]["alice__bob"][0]["type"], "text");
}

#[tokio::test]
async fn each_flush_replaces_the_whole_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_data.json");
    let repository = JsonFileStoreRepository::new(&path, true);

    repository.flush(&sample_store()).await.unwrap();
    repository.flush(&Store::new()).await.unwrap();

    let reloaded = repository.load().await.unwrap();
    assert_eq!(reloaded, Store::new());
}

#[tokio::test]
async fn documents_written_by_older_versions_load_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_data.json");
    std::fs::write(
        &path,
        r#"{
            "users": {"bob": {"display_name": "Bob", "credential": "abc"}},
            "chats": {"alice__bob": [{"sender": "bob", "text": "yo", "time": "08:00", "date": "2023-12-31"}]}
        }"#,
    )
    .unwrap();

    let store = JsonFileStoreRepository::new(&path, true).load().await.unwrap();
    let bob = store.user(&Username::parse("bob").unwrap()).unwrap();
    assert!(!bob.online);
    assert_eq!(bob.session_id, None);
    let key = ChatKey::between(
        &Username::parse("alice").unwrap(),
        &Username::parse("bob").unwrap(),
    );
    assert_eq!(store.chats[&key][0].message_type, MessageType::Text);
}

#[tokio::test]
async fn corrupt_document_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat_data.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = JsonFileStoreRepository::new(&path, true).load().await;
    assert!(matches!(
        result,
        Err(application::RepositoryError::Serialization(_))
    ));
}

#[tokio::test]
async fn unwritable_location_fails_flush() {
    let dir = tempfile::tempdir().unwrap();
    // 目标路径的父级是一个普通文件，无法创建目录
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();
    let repository = JsonFileStoreRepository::new(blocker.join("chat_data.json"), true);

    assert!(repository.flush(&Store::new()).await.is_err());
}
