mod common;

use common::{Post, author, client, id_of, post, sent};
use relkv::{DbError, shared};

#[tokio::test]
async fn test_delete_removes_every_key() {
    let (store, client) = client().await;
    let ann = author("Ann Lee", 4.0);
    ann.write().unwrap().verified = true;
    client.save(&ann).await.unwrap();
    assert!(store.key_count().await > 0);

    client.delete(&ann).await.unwrap();
    assert_eq!(store.key_count().await, 0);

    assert!(matches!(
        client.find_by_id::<common::Author>(&id_of(&ann)).await,
        Err(DbError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_delete_removes_collections_and_relationships() {
    let (store, client) = client().await;
    let ann = author("Ann", 1.0);
    client.save(&ann).await.unwrap();

    let hello = shared(Post {
        title: "Hello".into(),
        labels: vec!["x".into()],
        lines: vec!["y".into()],
        author: Some(ann.clone()),
        ..Post::default()
    });
    client.save(&hello).await.unwrap();
    client.delete(&hello).await.unwrap();

    let id = id_of(&hello);
    for suffix in ["", ":Labels", ":Lines", ":Author"] {
        assert!(!store.exists(&format!("post:{id}{suffix}")).await);
    }
    assert!(store.exists(&format!("author:{}", id_of(&ann))).await);
    assert_eq!(client.query::<Post>().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_by_id_uses_stored_index_values() {
    let (store, client) = client().await;
    let ann = author("Ann", 2.5);
    client.save(&ann).await.unwrap();
    let id = id_of(&ann);

    client.delete_by_id("author", &id).await.unwrap();

    assert_eq!(store.key_count().await, 0);
    let log = sent(&store).await;
    assert!(log.contains(&format!("ZREM author:Name Ann {id}")));
    assert!(log.contains(&format!("ZREM author:Rating {id}")));
}

#[tokio::test]
async fn test_delete_by_id_of_missing_record() {
    let (store, client) = client().await;
    let ann = author("Ann", 1.0);
    client.save(&ann).await.unwrap();
    let before = store.key_count().await;

    client.delete_by_id("author", "ghost").await.unwrap();

    assert_eq!(store.key_count().await, before);
    assert!(!sent(&store).await.iter().any(|c| c.starts_with("DEL author:ghost")));
}

#[tokio::test]
async fn test_delete_by_id_of_unknown_model() {
    let (_store, client) = client().await;
    assert!(matches!(
        client.delete_by_id("draft", "1").await,
        Err(DbError::UnregisteredType(name)) if name == "draft"
    ));
}

#[tokio::test]
async fn test_delete_of_unsaved_record_sends_nothing() {
    let (store, client) = client().await;
    client.delete(&post("Unsaved")).await.unwrap();
    assert!(!sent(&store).await.iter().any(|c| c.starts_with("DEL")));
}
