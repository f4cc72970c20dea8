//! Integration tests for filter schema generation.
//!
//! These tests verify that generation terminates on cyclic catalogs, honors
//! the relation depth limit and feature flags, and that a shared generator
//! caches results safely.

use graphfilter::TypeGenerator;
use graphfilter::query::FilterSettings;
use graphfilter::schema::{Catalog, Entity, Field, FieldKind, Relation};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Users befriend users, write posts, and comment on posts.
fn social() -> Catalog {
    Catalog::new()
        .with_entity(
            Entity::new("User")
                .field(Field::new("id", FieldKind::Id))
                .field(Field::new("handle", FieldKind::Text))
                .field(Field::new("joined_at", FieldKind::DateTime))
                .relation(Relation::to_many("friends", "User"))
                .relation(Relation::to_many("posts", "Post"))
                .relation(Relation::to_one("best_friend", "User")),
        )
        .with_entity(
            Entity::new("Post")
                .field(Field::new("id", FieldKind::Id))
                .field(Field::new("title", FieldKind::Text))
                .field(Field::new("published_on", FieldKind::Date))
                .relation(Relation::to_one("author", "User"))
                .relation(Relation::to_many("comments", "Comment")),
        )
        .with_entity(
            Entity::new("Comment")
                .field(Field::new("id", FieldKind::Id))
                .field(Field::new("body", FieldKind::Text))
                .relation(Relation::to_one("post", "Post"))
                .relation(Relation::to_one("author", "User")),
        )
}

fn generator(settings: &FilterSettings) -> TypeGenerator {
    TypeGenerator::new(Arc::new(social()), settings)
}

/// Test that cyclic relations terminate at the depth limit
#[test]
fn test_cyclic_catalog_terminates() {
    for max in 0..=5 {
        let settings = FilterSettings::default().with_max_relation_depth(max);
        let schema = generator(&settings)
            .generate_filter_schema("User", 0)
            .expect("User is in the catalog");

        assert_eq!(schema.placeholder_count(), 0);
        let not = schema.root_type().field("NOT").unwrap();
        assert_eq!(schema.render_type(&not.ty), "UserWhereInput");
        if max >= 2 {
            assert!(schema.by_name(&format!("UserWhereInputDepth{}", max - 1)).is_some());
        }
        assert!(schema.by_name(&format!("UserWhereInputDepth{}", max)).is_none());
        assert!(schema.by_name(&format!("PostWhereInputDepth{}", max)).is_none());
    }
}

/// Test the keys offered at each depth
#[test]
fn test_keys_by_depth() {
    let schema = generator(&FilterSettings::default())
        .generate_filter_schema("User", 0)
        .unwrap();

    let root = schema.root_type();
    assert_eq!(root.name, "UserWhereInput");
    for key in ["friends", "friends_some", "friends_every", "friends_none", "friends_agg",
        "friends_count", "best_friend", "best_friend_rel", "posts_some", "id", "quick",
        "include", "AND", "OR", "NOT", "_compare"]
    {
        assert!(root.has_field(key), "missing {key}");
    }
    assert_eq!(schema.render_type(&root.field("friends_some").unwrap().ty), "UserWhereInputDepth1");
    assert_eq!(schema.render_type(&root.field("posts_agg").unwrap().ty), "AggregateFilter");
    assert_eq!(schema.render_type(&root.field("AND").unwrap().ty), "[UserWhereInput]");

    let deepest = schema.by_name("PostWhereInputDepth2").unwrap();
    assert!(deepest.has_field("author"));
    assert!(deepest.has_field("comments_count"));
    assert!(!deepest.has_field("author_rel"));
    assert!(!deepest.has_field("comments_some"));
}

/// Test that a zero depth limit drops every relation key
#[test]
fn test_zero_depth_has_no_relations() {
    let settings = FilterSettings::all_features().with_max_relation_depth(0);
    let schema = generator(&settings).generate_filter_schema("Post", 0).unwrap();
    let root = schema.root_type();

    assert!(!root.has_field("author"));
    assert!(!root.has_field("comments_agg"));
    assert!(!root.has_field("_exists"));
    assert!(!root.has_field("_subquery"));
    assert!(root.has_field("_window"));
    assert!(root.has_field("published_on_trunc"));
    assert!(root.has_field("search"));
}

/// Test scoped type names
#[test]
fn test_scoped_generation() {
    let generator = generator(&FilterSettings::default());
    let scoped = generator.generate_scoped("Admin", "Post", 0).unwrap();
    let plain = generator.generate_filter_schema("Post", 0).unwrap();

    assert_eq!(scoped.root_type().name, "AdminPostWhereInput");
    assert!(scoped.by_name("AdminUserWhereInputDepth1").is_some());
    assert_eq!(plain.root_type().name, "PostWhereInput");
    assert_eq!(generator.cache_len(), 2);
}

/// Test that an unknown entity yields nothing
#[test]
fn test_unknown_entity() {
    assert!(generator(&FilterSettings::default())
        .generate_filter_schema("Group", 0)
        .is_none());
}

/// Test the SDL rendering
#[test]
fn test_sdl_output() {
    let schema = generator(&FilterSettings::default().with_max_relation_depth(1))
        .generate_filter_schema("Comment", 0)
        .unwrap();
    let sdl = schema.to_sdl();

    assert!(sdl.contains("input CommentWhereInput {\n"));
    assert!(sdl.contains("  body: StringFilter\n"));
    assert!(sdl.contains("  OR: [CommentWhereInput]\n"));
    assert!(!sdl.contains("post_rel"));
}

/// Test that a shared generator serves many threads and stays bounded
#[test]
fn test_shared_generator_across_threads() {
    let mut settings = FilterSettings::default();
    settings.schema.cache_max_size = 2;
    let generator = generator(&settings);
    let expected = generator.generate_filter_schema("User", 0).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let generator = &generator;
                scope.spawn(move || {
                    let entity = ["User", "Post", "Comment"][i % 3];
                    (entity, generator.generate_filter_schema(entity, 0).unwrap())
                })
            })
            .collect();
        for handle in handles {
            let (entity, schema) = handle.join().unwrap();
            assert_eq!(schema.root_type().name, format!("{entity}WhereInput"));
            if entity == "User" {
                assert_eq!(*schema, *expected);
            }
        }
    });

    let stats = generator.stats();
    assert_eq!(stats.hits + stats.misses, 9);
    assert!(generator.cache_len() <= 2);
}
