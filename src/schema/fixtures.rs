//! Models shared by the unit tests.

use super::{IndexKind, Model, ModelSchema, Registry, SchemaBuilder, Shared};

#[derive(Debug, Clone, Default)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub age: i64,
    pub active: bool,
    pub nickname: Option<String>,
    pub tags: Vec<String>,
    pub scores: Vec<i64>,
}

impl Model for Person {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("person")
            .scalar("Name", |p| &p.name, |p| &mut p.name)
            .index(IndexKind::Lexical)
            .scalar("Age", |p| &p.age, |p| &mut p.age)
            .index(IndexKind::Numeric)
            .scalar("Active", |p| &p.active, |p| &mut p.active)
            .index(IndexKind::Boolean)
            .scalar("Nickname", |p| &p.nickname, |p| &mut p.nickname)
            .list("Tags", |p| &p.tags, |p| &mut p.tags)
            .set("Scores", |p| &p.scores, |p| &mut p.scores)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Color {
    pub id: String,
    pub r: i64,
    pub g: i64,
    pub b: i64,
}

impl Model for Color {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("color")
            .scalar("R", |c| &c.r, |c| &mut c.r)
            .scalar("G", |c| &c.g, |c| &mut c.g)
            .scalar("B", |c| &c.b, |c| &mut c.b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub favorite_color: Option<Shared<Color>>,
}

impl Model for Artist {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("artist")
            .scalar("Name", |a| &a.name, |a| &mut a.name)
            .one("FavoriteColor", |a| &a.favorite_color, |a| &mut a.favorite_color)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pet {
    pub id: String,
    pub name: String,
}

impl Model for Pet {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("pet").scalar("Name", |p| &p.name, |p| &mut p.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PetOwner {
    pub id: String,
    pub name: String,
    pub pets: Vec<Shared<Pet>>,
}

impl Model for PetOwner {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("petOwner")
            .scalar("Name", |o| &o.name, |o| &mut o.name)
            .many("Pets", |o| &o.pets, |o| &mut o.pets)
    }
}

/// Self-referencing model for cycle tests.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub id: String,
    pub label: Option<String>,
    pub next: Option<Shared<Node>>,
}

impl Model for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn schema() -> SchemaBuilder<Self> {
        ModelSchema::builder::<Self>("node")
            .scalar("Label", |n| &n.label, |n| &mut n.label)
            .one("Next", |n| &n.next, |n| &mut n.next)
    }
}

pub fn registry() -> Registry {
    Registry::new()
        .with::<Person>()
        .and_then(|r| r.with::<Color>())
        .and_then(|r| r.with::<Artist>())
        .and_then(|r| r.with::<Pet>())
        .and_then(|r| r.with::<PetOwner>())
        .and_then(|r| r.with::<Node>())
        .expect("fixture models register")
}
