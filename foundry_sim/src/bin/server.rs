use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::thread;

use bevy::app::Update;
use bevy::math::UVec2;
use bevy::prelude::{App, Entity, IntoSystemConfigs};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use foundry_sim::metrics::{collect_metrics, FactoryMetrics};
use foundry_sim::network::start_replication_server;
use foundry_sim::{
    advance_tick, build_headless_app_with_role, despawn_unit, load_factory_state, place_factory,
    run_tick, save_factory_state, ItemKind, ItemLedger, NetworkRole, PowerSupply,
    ReplicationOutbox, SimulationConfig, TeamId, TileIndex, UnitFactory,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = build_headless_app_with_role(NetworkRole::Server);
    app.insert_resource(FactoryMetrics::default());
    app.add_systems(Update, collect_metrics.after(advance_tick));

    let config = app.world.resource::<SimulationConfig>().clone();

    match start_replication_server(config.replication_bind) {
        Some(server) => app
            .world
            .resource_mut::<ReplicationOutbox>()
            .connect(server.sender()),
        None => warn!(
            target: "foundry::server",
            "replication disabled; observers will not see spawns"
        ),
    }

    let Some(command_rx) = spawn_command_listener(config.command_bind) else {
        return;
    };

    info!(
        target: "foundry::server",
        command_bind = %config.command_bind,
        replication_bind = %config.replication_bind,
        "Foundry headless server ready"
    );

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Tick(ticks) => {
                for _ in 0..ticks {
                    run_tick(&mut app);
                }
                report_metrics(&app);
            }
            Command::Place {
                position,
                factory,
                team,
            } => match place_factory(&mut app.world, &factory, position, team) {
                Ok(entity) => info!(
                    target: "foundry::server",
                    %factory,
                    x = position.x,
                    y = position.y,
                    entity = entity.to_bits(),
                    "command.applied=place"
                ),
                Err(err) => warn!(target: "foundry::server", error = %err, "command.rejected=place"),
            },
            Command::Stock {
                position,
                item,
                amount,
            } => apply_stock(&mut app, position, item, amount),
            Command::Power {
                position,
                satisfaction,
            } => apply_power(&mut app, position, satisfaction),
            Command::Remove { unit } => {
                let removed = Entity::try_from_bits(unit)
                    .map(|entity| despawn_unit(&mut app.world, entity))
                    .unwrap_or(false);
                if removed {
                    info!(target: "foundry::server", unit, "command.applied=remove");
                } else {
                    warn!(target: "foundry::server", unit, "command.rejected=unknown_unit");
                }
            }
            Command::Save { position } => match save_factory_state(&app.world, position) {
                Ok(bytes) => info!(
                    target: "foundry::server",
                    x = position.x,
                    y = position.y,
                    record = %to_hex(&bytes),
                    "command.applied=save"
                ),
                Err(err) => warn!(target: "foundry::server", error = %err, "command.rejected=save"),
            },
            Command::Load { position, record } => {
                match load_factory_state(&mut app.world, position, &record) {
                    Ok(()) => info!(
                        target: "foundry::server",
                        x = position.x,
                        y = position.y,
                        "command.applied=load"
                    ),
                    Err(err) => {
                        warn!(target: "foundry::server", error = %err, "command.rejected=load")
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
enum Command {
    Tick(u32),
    Place {
        position: UVec2,
        factory: String,
        team: TeamId,
    },
    Stock {
        position: UVec2,
        item: ItemKind,
        amount: u32,
    },
    Power {
        position: UVec2,
        satisfaction: f32,
    },
    Remove {
        unit: u64,
    },
    Save {
        position: UVec2,
    },
    Load {
        position: UVec2,
        record: Vec<u8>,
    },
}

fn spawn_command_listener(bind_addr: std::net::SocketAddr) -> Option<Receiver<Command>> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            warn!(
                target: "foundry::server",
                bind = %bind_addr,
                error = %err,
                "command listener bind failed"
            );
            return None;
        }
    };

    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Ok(addr) = stream.peer_addr() {
                        info!(target: "foundry::server", %addr, "Command client connected");
                    }
                    let sender = sender.clone();
                    thread::spawn(move || handle_client(stream, sender));
                }
                Err(err) => warn!(target: "foundry::server", error = %err, "Error accepting command client"),
            }
        }
    });

    Some(receiver)
}

fn handle_client(stream: std::net::TcpStream, sender: Sender<Command>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_command(trimmed) {
                    Some(cmd) => {
                        if sender.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => warn!(target: "foundry::server", "Invalid command: {}", trimmed),
                }
            }
            Err(err) => {
                warn!(target: "foundry::server", "Command read error: {}", err);
                break;
            }
        }
    }
}

fn parse_position<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<UVec2> {
    let x: u32 = parts.next()?.parse().ok()?;
    let y: u32 = parts.next()?.parse().ok()?;
    Some(UVec2::new(x, y))
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    match parts.next()? {
        "tick" => {
            let amount = parts.next().unwrap_or("1").parse().ok()?;
            Some(Command::Tick(amount))
        }
        "place" => {
            let position = parse_position(&mut parts)?;
            let factory = parts.next()?.to_string();
            let team: u8 = parts.next().unwrap_or("1").parse().ok()?;
            Some(Command::Place {
                position,
                factory,
                team: TeamId(team),
            })
        }
        "stock" => {
            let position = parse_position(&mut parts)?;
            let item = ItemKind::parse(parts.next()?)?;
            let amount = parts.next()?.parse().ok()?;
            Some(Command::Stock {
                position,
                item,
                amount,
            })
        }
        "power" => {
            let position = parse_position(&mut parts)?;
            let satisfaction = parts.next()?.parse().ok()?;
            Some(Command::Power {
                position,
                satisfaction,
            })
        }
        "remove" => {
            let unit = parts.next()?.parse().ok()?;
            Some(Command::Remove { unit })
        }
        "save" => {
            let position = parse_position(&mut parts)?;
            Some(Command::Save { position })
        }
        "load" => {
            let position = parse_position(&mut parts)?;
            let record = from_hex(parts.next()?)?;
            Some(Command::Load { position, record })
        }
        _ => None,
    }
}

fn apply_stock(app: &mut App, position: UVec2, item: ItemKind, amount: u32) {
    let Some(entity) = app.world.resource::<TileIndex>().get(position) else {
        warn!(target: "foundry::server", x = position.x, y = position.y, "stock.rejected=no_block");
        return;
    };
    let Some(requirement) = app
        .world
        .get::<UnitFactory>(entity)
        .map(|factory| factory.config().requirements().clone())
    else {
        warn!(target: "foundry::server", x = position.x, y = position.y, "stock.rejected=not_a_factory");
        return;
    };
    let Some(mut ledger) = app.world.get_mut::<ItemLedger>(entity) else {
        return;
    };
    let accepted = requirement.deposit(&mut ledger, item, amount);
    info!(
        target: "foundry::server",
        %item,
        offered = amount,
        accepted,
        "command.applied=stock"
    );
}

fn apply_power(app: &mut App, position: UVec2, satisfaction: f32) {
    let Some(entity) = app.world.resource::<TileIndex>().get(position) else {
        warn!(target: "foundry::server", x = position.x, y = position.y, "power.rejected=no_block");
        return;
    };
    let clamped = satisfaction.clamp(0.0, 1.0);
    app.world.entity_mut(entity).insert(PowerSupply {
        satisfaction: clamped,
    });
    info!(target: "foundry::server", satisfaction = clamped, "command.applied=power");
}

fn report_metrics(app: &App) {
    let metrics = app.world.resource::<FactoryMetrics>();
    info!(
        target: "foundry::server",
        tick = metrics.tick,
        factories = metrics.factories,
        units_alive = metrics.units_alive,
        outstanding = metrics.outstanding_total,
        capped = metrics.capped_factories,
        stalled = metrics.stalled_factories,
        completions = metrics.completions_total,
        avg_progress = metrics.avg_progress_fraction,
        "tick.completed"
    );
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(text.get(idx..idx + 2)?, 16).ok())
        .collect()
}
