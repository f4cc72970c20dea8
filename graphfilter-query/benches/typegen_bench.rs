//! Benchmarks for filter schema generation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use graphfilter_query::{FilterSettings, TypeGenerator};
use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
use std::sync::Arc;

/// A small social graph with cycles in every direction.
fn cyclic_catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            Entity::new("User")
                .field(Field::new("id", FieldKind::Id))
                .field(Field::new("name", FieldKind::Text))
                .field(Field::new("joined_at", FieldKind::DateTime))
                .relation(Relation::to_many("friends", "User"))
                .relation(Relation::to_many("posts", "Post")),
        )
        .with_entity(
            Entity::new("Post")
                .field(Field::new("id", FieldKind::Id))
                .field(Field::new("title", FieldKind::Text))
                .field(Field::new("score", FieldKind::Int))
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

fn bench_cold_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("typegen_cold");
    let catalog: Arc<Catalog> = Arc::new(cyclic_catalog());

    for depth in [1usize, 2, 3, 4] {
        let settings = FilterSettings::all_features().with_max_relation_depth(depth);
        group.bench_with_input(BenchmarkId::new("max_depth", depth), &settings, |b, settings| {
            b.iter(|| {
                let generator = TypeGenerator::new(catalog.clone(), settings);
                black_box(generator.generate_filter_schema("User", 0))
            })
        });
    }

    group.finish();
}

fn bench_cached_generation(c: &mut Criterion) {
    let generator = TypeGenerator::new(Arc::new(cyclic_catalog()), &FilterSettings::all_features());
    generator.generate_filter_schema("User", 0);

    c.bench_function("typegen_cached", |b| {
        b.iter(|| black_box(generator.generate_filter_schema("User", 0)))
    });
}

criterion_group!(benches, bench_cold_generation, bench_cached_generation);
criterion_main!(benches);
