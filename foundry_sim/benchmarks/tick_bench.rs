use bevy::math::UVec2;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use foundry_sim::{
    build_headless_app, place_factory, run_tick, ItemKind, ItemLedger, TeamId, TileIndex,
};

/// Places `count` dagger factories in rows, half stocked and half left to the
/// wave team.
fn populated_app(count: u32) -> bevy::app::App {
    let mut app = build_headless_app();
    for idx in 0..count {
        let position = UVec2::new((idx % 64) * 2, (idx / 64) * 2);
        let team = if idx % 2 == 0 { TeamId(1) } else { TeamId(2) };
        if place_factory(&mut app.world, "dagger-factory", position, team).is_err() {
            continue;
        }
        if let Some(entity) = app.world.resource::<TileIndex>().get(position) {
            app.world.entity_mut(entity).insert(ItemLedger::with_items([
                (ItemKind::Silicon, 20),
                (ItemKind::Lead, 20),
            ]));
        }
    }
    app
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for count in [16u32, 128, 512, 2048] {
        group.bench_with_input(BenchmarkId::new("factories", count), &count, |b, &count| {
            b.iter_batched(
                || populated_app(count),
                |mut app| {
                    for _ in 0..10 {
                        run_tick(&mut app);
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(tick_benches, bench_tick);
criterion_main!(tick_benches);
