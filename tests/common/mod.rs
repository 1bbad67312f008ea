#![allow(dead_code)]

use relkv::{
    Client, ConnectionConfig, IndexKind, MemoryStore, Model, ModelSchema, Registry,
    SchemaBuilder, Shared, shared,
};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub rating: f64,
    pub verified: bool,
}

impl Model for Author {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("author")
            .scalar("Name", |a| &a.name, |a| &mut a.name)
            .index(IndexKind::Lexical)
            .scalar("Email", |a| &a.email, |a| &mut a.email)
            .store_as("mail")
            .scalar("Rating", |a| &a.rating, |a| &mut a.rating)
            .index(IndexKind::Numeric)
            .scalar("Verified", |a| &a.verified, |a| &mut a.verified)
            .index(IndexKind::Boolean)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub views: i64,
    pub labels: Vec<String>,
    pub lines: Vec<String>,
    pub author: Option<Shared<Author>>,
    pub related: Vec<Shared<Post>>,
}

impl Model for Post {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("post")
            .scalar("Title", |p| &p.title, |p| &mut p.title)
            .scalar("Views", |p| &p.views, |p| &mut p.views)
            .index(IndexKind::Numeric)
            .set("Labels", |p| &p.labels, |p| &mut p.labels)
            .list("Lines", |p| &p.lines, |p| &mut p.lines)
            .one("Author", |p| &p.author, |p| &mut p.author)
            .many("Related", |p| &p.related, |p| &mut p.related)
    }
}

/// Never registered.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub id: String,
    pub text: String,
}

impl Model for Draft {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("draft").scalar("Text", |d| &d.text, |d| &mut d.text)
    }
}

pub fn registry() -> Registry {
    Registry::new()
        .with::<Author>()
        .and_then(|r| r.with::<Post>())
        .expect("test models register")
}

/// Client over a store the test can inspect directly.
pub async fn client() -> (MemoryStore, Client) {
    let store = MemoryStore::new();
    let client = Client::connect(
        ConnectionConfig::default().max_connections(4),
        Arc::new(store.clone()),
        registry(),
    )
    .await
    .unwrap();
    (store, client)
}

pub async fn sent(store: &MemoryStore) -> Vec<String> {
    store.commands().await.iter().map(|c| c.to_string()).collect()
}

pub fn author(name: &str, rating: f64) -> Shared<Author> {
    shared(Author {
        name: name.to_string(),
        rating,
        ..Author::default()
    })
}

pub fn post(title: &str) -> Shared<Post> {
    shared(Post {
        title: title.to_string(),
        ..Post::default()
    })
}

pub fn id_of<M: Model>(record: &Shared<M>) -> String {
    record.read().unwrap().id().to_string()
}
