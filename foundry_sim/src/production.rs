//! Production timing for unit factories.
//!
//! A tick advances the animation phase, asks the [`SpawnGate`] whether the
//! factory may keep working and then hands over to the controller picked by
//! [`ProductionMode`]. Trusted factories pay for progress with items and
//! power; untrusted ones wait out a grace period and then produce for free at
//! an escalating rate.

use crate::{
    components::FactoryState, factory_config::FactoryConfig, ledger::ResourceLedger,
    spawn::SpawnGate,
};

/// Per-tick blend factor used when easing `speed_factor` toward its target.
pub const SPEED_SMOOTHING: f32 = 0.05;

/// Rate untrusted factories start at once the grace period is over.
pub const BASE_ESCALATION_RATE: f32 = 0.1;

/// Eases `current` toward `target`, independent of tick length.
pub fn smooth_toward(current: f32, target: f32, dt: f32) -> f32 {
    let blend = 1.0 - (1.0 - SPEED_SMOOTHING).powf(dt.max(0.0));
    (current + (target - current) * blend).clamp(0.0, 1.0)
}

/// Which controller drives a factory this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionMode {
    /// Progress is paid for with items and power.
    Trusted,
    /// Items are ignored; progress starts after the grace period.
    Untrusted,
}

impl ProductionMode {
    pub fn from_untrusted(untrusted: bool) -> Self {
        if untrusted {
            ProductionMode::Untrusted
        } else {
            ProductionMode::Trusted
        }
    }
}

/// Inputs the trusted controller reads from the factory's other components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionInputs {
    pub dt: f32,
    /// Non-item consumers (power, liquids) are satisfied.
    pub consume_valid: bool,
    pub power_satisfaction: f32,
}

impl ProductionInputs {
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            consume_valid: true,
            power_satisfaction: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The outstanding cap is reached; nothing but the phase moved.
    Gated,
    /// The controller refused progress this tick.
    Stalled,
    Advanced,
    /// Progress crossed the threshold and was reset. The caller owes one
    /// spawn call and one batch of items.
    Completed,
}

/// Runs one tick of the production timer against `state`.
pub fn advance_production<L: ResourceLedger + ?Sized>(
    state: &mut FactoryState,
    config: &FactoryConfig,
    mode: ProductionMode,
    ledger: &L,
    inputs: ProductionInputs,
) -> TickOutcome {
    state.phase += inputs.dt * state.speed_factor;

    if !SpawnGate::permits(state, config) {
        return TickOutcome::Gated;
    }

    let advanced = match mode {
        ProductionMode::Trusted => trusted_step(state, config, ledger, inputs),
        ProductionMode::Untrusted => untrusted_step(state, config, inputs.dt),
    };

    if state.progress >= config.produce_time() {
        state.progress = 0.0;
        TickOutcome::Completed
    } else if advanced {
        TickOutcome::Advanced
    } else {
        TickOutcome::Stalled
    }
}

fn trusted_step<L: ResourceLedger + ?Sized>(
    state: &mut FactoryState,
    config: &FactoryConfig,
    ledger: &L,
    inputs: ProductionInputs,
) -> bool {
    let fraction = state.progress_fraction(config);
    if inputs.consume_valid && config.requirements().satisfied_at(ledger, fraction) {
        state.progress += inputs.dt * inputs.power_satisfaction.clamp(0.0, 1.0);
        state.speed_factor = smooth_toward(state.speed_factor, 1.0, inputs.dt);
        true
    } else {
        state.speed_factor = smooth_toward(state.speed_factor, 0.0, inputs.dt);
        false
    }
}

fn untrusted_step(state: &mut FactoryState, config: &FactoryConfig, dt: f32) -> bool {
    state.warmup += dt;
    if state.warmup > config.grace_threshold() {
        state.progress += dt * escalation_rate(config, state.warmup);
        state.speed_factor = smooth_toward(state.speed_factor, 1.0, dt);
        true
    } else {
        state.speed_factor = smooth_toward(state.speed_factor, 0.0, dt);
        false
    }
}

/// Progress per time-unit of an untrusted factory with the given warmup.
/// Zero while the grace period lasts.
pub fn escalation_rate(config: &FactoryConfig, warmup: f32) -> f32 {
    let grace = config.grace_threshold();
    if warmup <= grace {
        return 0.0;
    }
    (BASE_ESCALATION_RATE + (warmup - grace) / config.speedup_time()).min(config.max_speedup())
}
