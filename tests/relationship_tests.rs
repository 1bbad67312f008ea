mod common;

use common::{Post, author, client, id_of, post, sent};
use relkv::{Command, DbError, Reply, Shared, shared};
use std::sync::Arc;

#[tokio::test]
async fn test_to_one_is_stored_by_id() {
    let (store, client) = client().await;
    let ann = author("Ann", 3.0);
    client.save(&ann).await.unwrap();

    let hello = post("Hello");
    hello.write().unwrap().author = Some(ann.clone());
    client.save(&hello).await.unwrap();

    let key = format!("post:{}:Author", id_of(&hello));
    let reply = store.apply(&Command::new("GET").arg(&key)).await;
    assert_eq!(reply, Reply::Bulk(id_of(&ann)));

    let found = client.find_by_id::<Post>(&id_of(&hello)).await.unwrap();
    let found_author = found.read().unwrap().author.clone().unwrap();
    assert_eq!(found_author.read().unwrap().name, "Ann");
    assert_eq!(found_author.read().unwrap().rating, 3.0);
}

#[tokio::test]
async fn test_to_many_is_stored_as_id_set() {
    let (store, client) = client().await;
    let first = post("First");
    let second = post("Second");
    client.save(&first).await.unwrap();
    client.save(&second).await.unwrap();

    let hub = post("Hub");
    hub.write().unwrap().related = vec![first.clone(), second.clone()];
    client.save(&hub).await.unwrap();

    let key = format!("post:{}:Related", id_of(&hub));
    let mut stored = store
        .apply(&Command::new("SMEMBERS").arg(&key))
        .await
        .into_strings()
        .unwrap();
    stored.sort();
    let mut expected = vec![id_of(&first), id_of(&second)];
    expected.sort();
    assert_eq!(stored, expected);

    let found = client.find_by_id::<Post>(&id_of(&hub)).await.unwrap();
    let mut found_ids: Vec<String> = found
        .read()
        .unwrap()
        .related
        .iter()
        .map(id_of)
        .collect();
    found_ids.sort();
    assert_eq!(found_ids, expected);

    let mut titles: Vec<String> = found
        .read()
        .unwrap()
        .related
        .iter()
        .map(|p| p.read().unwrap().title.clone())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["First", "Second"]);
}

#[tokio::test]
async fn test_unsetting_relationships_deletes_their_keys() {
    let (store, client) = client().await;
    let ann = author("Ann", 1.0);
    let other = post("Other");
    client.save(&ann).await.unwrap();
    client.save(&other).await.unwrap();

    let hello = post("Hello");
    {
        let mut guard = hello.write().unwrap();
        guard.author = Some(ann.clone());
        guard.related = vec![other.clone()];
    }
    client.save(&hello).await.unwrap();
    let id = id_of(&hello);
    assert!(store.exists(&format!("post:{id}:Author")).await);
    assert!(store.exists(&format!("post:{id}:Related")).await);

    {
        let mut guard = hello.write().unwrap();
        guard.author = None;
        guard.related.clear();
    }
    client.save(&hello).await.unwrap();
    assert!(!store.exists(&format!("post:{id}:Author")).await);
    assert!(!store.exists(&format!("post:{id}:Related")).await);
}

#[tokio::test]
async fn test_unsaved_reference_fails_before_sending() {
    let (store, client) = client().await;
    let hello = post("Hello");
    hello.write().unwrap().author = Some(author("Nobody", 0.0));

    let err = client.save(&hello).await.unwrap_err();
    match err {
        DbError::UnsavedReference { field, type_name } => {
            assert_eq!(field, "Author");
            assert_eq!(type_name, "author");
        }
        other => panic!("expected UnsavedReference, got {other:?}"),
    }
    assert!(sent(&store).await.is_empty());
    assert!(id_of(&hello).is_empty());
}

#[tokio::test]
async fn test_cycle_resolves_with_shared_identity() {
    let (_store, client) = client().await;
    let a = shared(Post {
        id: "a".into(),
        title: "A".into(),
        ..Post::default()
    });
    let b = shared(Post {
        id: "b".into(),
        title: "B".into(),
        related: vec![a.clone()],
        ..Post::default()
    });
    a.write().unwrap().related = vec![b.clone()];

    let mut tx = client.transaction().await.unwrap();
    tx.save(&a).unwrap();
    tx.save(&b).unwrap();
    tx.exec().await.unwrap();
    a.write().unwrap().related.clear();

    let found_a = client.find_by_id::<Post>("a").await.unwrap();
    let found_b = found_a.read().unwrap().related[0].clone();
    assert_eq!(found_b.read().unwrap().title, "B");

    let back: Shared<Post> = found_b.read().unwrap().related[0].clone();
    assert_eq!(back.read().unwrap().title, "A");
    assert!(Arc::ptr_eq(&back, &found_a));

    found_a.write().unwrap().related.clear();
}

#[tokio::test]
async fn test_shared_target_is_loaded_once() {
    let (store, client) = client().await;
    let ann = author("Ann", 1.0);
    client.save(&ann).await.unwrap();

    let first = post("First");
    let second = post("Second");
    first.write().unwrap().author = Some(ann.clone());
    second.write().unwrap().author = Some(ann.clone());
    client.save(&first).await.unwrap();
    client.save(&second).await.unwrap();

    let hub = post("Hub");
    hub.write().unwrap().related = vec![first.clone(), second.clone()];
    client.save(&hub).await.unwrap();
    store.clear_log().await;

    let found = client.find_by_id::<Post>(&id_of(&hub)).await.unwrap();
    let related = found.read().unwrap().related.clone();
    let left = related[0].read().unwrap().author.clone().unwrap();
    let right = related[1].read().unwrap().author.clone().unwrap();
    assert!(Arc::ptr_eq(&left, &right));

    let author_reads = sent(&store)
        .await
        .iter()
        .filter(|c| c.starts_with(&format!("HGETALL author:{}", id_of(&ann))))
        .count();
    assert_eq!(author_reads, 1);
}
