use bevy::prelude::*;

use crate::{
    components::{FactoryState, Unit, UnitFactory},
    resources::{ProductionTelemetry, SimulationTick},
};

#[derive(Resource, Default, Debug, Clone)]
pub struct FactoryMetrics {
    pub tick: u64,
    pub factories: u32,
    pub units_alive: u32,
    pub outstanding_total: u64,
    pub avg_progress_fraction: f32,
    pub capped_factories: u32,
    pub stalled_factories: u32,
    pub completions_total: u64,
    pub units_spawned_total: u64,
}

pub fn collect_metrics(
    tick: Res<SimulationTick>,
    telemetry: Res<ProductionTelemetry>,
    mut metrics: ResMut<FactoryMetrics>,
    factories: Query<(&UnitFactory, &FactoryState)>,
    units: Query<(), With<Unit>>,
) {
    let mut count = 0u32;
    let mut outstanding = 0u64;
    let mut progress = 0f64;
    let mut capped = 0u32;

    for (factory, state) in factories.iter() {
        count += 1;
        if !factory.can_produce(state) {
            capped += 1;
        }
        outstanding += state.outstanding as u64;
        progress += state.progress_fraction(factory.config()) as f64;
    }

    metrics.tick = tick.0;
    metrics.factories = count;
    metrics.units_alive = units.iter().count() as u32;
    metrics.outstanding_total = outstanding;
    metrics.avg_progress_fraction = if count > 0 {
        (progress / count as f64) as f32
    } else {
        0.0
    };
    metrics.capped_factories = capped;
    metrics.stalled_factories = telemetry.stalled;
    metrics.completions_total = telemetry.completed_total;
    metrics.units_spawned_total = telemetry.units_spawned_total;
}
