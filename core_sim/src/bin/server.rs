use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use core_sim::network::{broadcast_latest, start_snapshot_server};
use core_sim::timeline;
use core_sim::{
    build_headless_app, run_round, Anchor, Particle, ParticleId, SimulationConfig,
    SimulationMetrics, SnapshotHistory,
};
use sim_runtime::{parse_command_line, CommandPayload};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = build_headless_app();
    let config = app.world.resource::<SimulationConfig>().clone();

    let snapshot_server = start_snapshot_server(config.snapshot_bind);
    let command_rx = spawn_command_listener(config.command_bind);

    info!(
        command_bind = %config.command_bind,
        snapshot_bind = %config.snapshot_bind,
        "amoebot headless server ready"
    );

    while let Ok(command) = command_rx.recv() {
        match command {
            CommandPayload::Step { rounds } => {
                for _ in 0..rounds {
                    match run_round(&mut app) {
                        Ok(()) => {
                            let history = app.world.resource::<SnapshotHistory>();
                            broadcast_latest(snapshot_server.as_ref(), history);
                            let metrics = app.world.resource::<SimulationMetrics>();
                            info!(
                                target: "amoebot::server",
                                round = metrics.round,
                                particles = metrics.particle_count,
                                expanded = metrics.expanded_count,
                                bonds = metrics.bond_count,
                                "round.completed"
                            );
                        }
                        Err(error) => {
                            warn!(
                                target: "amoebot::server",
                                error = %error,
                                "round.failed -- rewind and resume to continue"
                            );
                            break;
                        }
                    }
                }
            }
            CommandPayload::Back => {
                let view = timeline::step_back(&mut app.world);
                info!(target: "amoebot::server", view, "timeline.view");
            }
            CommandPayload::Forward => {
                let view = timeline::step_forward(&mut app.world);
                info!(target: "amoebot::server", view, "timeline.view");
            }
            CommandPayload::Jump { round } => {
                let view = timeline::jump_to_round(&mut app.world, round);
                info!(target: "amoebot::server", view, "timeline.view");
            }
            CommandPayload::Resume => {
                timeline::continue_tracking(&mut app.world);
                let history = app.world.resource::<SnapshotHistory>();
                broadcast_latest(snapshot_server.as_ref(), history);
            }
            CommandPayload::CutOff => {
                timeline::cut_off(&mut app.world);
            }
            CommandPayload::Shift { delta } => {
                let applied = timeline::shift_timescale(&mut app.world, delta);
                if applied != delta {
                    warn!(
                        target: "amoebot::server",
                        requested = delta,
                        applied,
                        "timeline.shift_clamped"
                    );
                }
            }
            CommandPayload::Anchor { particle } => {
                handle_anchor(&mut app, ParticleId(particle));
            }
            CommandPayload::Status => {
                report_status(&mut app);
            }
        }
    }
}

fn handle_anchor(app: &mut bevy::prelude::App, particle: ParticleId) {
    let exists = {
        let mut query = app.world.query::<&Particle>();
        query.iter(&app.world).any(|p| p.id == particle)
    };
    if !exists {
        warn!(
            target: "amoebot::server",
            particle = particle.0,
            "anchor.rejected=unknown_particle"
        );
        return;
    }
    app.world.resource_mut::<Anchor>().particle = Some(particle);
    info!(target: "amoebot::server", particle = particle.0, "anchor.updated");
}

fn report_status(app: &mut bevy::prelude::App) {
    let view = timeline::view_round(&app.world);
    let latest = timeline::latest_round(&app.world);
    let metrics = app.world.resource::<SimulationMetrics>().clone();
    info!(
        target: "amoebot::server",
        round = latest,
        view,
        particles = metrics.particle_count,
        expanded = metrics.expanded_count,
        objects = metrics.object_count,
        bonds = metrics.bond_count,
        aborted = metrics.rounds_aborted,
        "status"
    );
}

fn spawn_command_listener(bind_addr: std::net::SocketAddr) -> Receiver<CommandPayload> {
    let listener = TcpListener::bind(bind_addr).expect("command listener bind failed");
    listener
        .set_nonblocking(true)
        .expect("set_nonblocking failed");

    let (sender, receiver) = unbounded::<CommandPayload>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("Command client connected: {}", addr);
                let sender = sender.clone();
                thread::spawn(move || handle_client(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(err) => {
                warn!("Error accepting command client: {}", err);
                thread::sleep(std::time::Duration::from_millis(200));
            }
        }
    });

    receiver
}

fn handle_client(stream: std::net::TcpStream, sender: Sender<CommandPayload>) {
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
                match parse_command_line(trimmed) {
                    Ok(command) => {
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("Invalid command '{}': {}", trimmed, err),
                }
            }
            Err(err) => {
                warn!("Command read error: {}", err);
                break;
            }
        }
    }
}
