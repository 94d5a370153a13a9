use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::daemon::{Daemon, DaemonConfig, Handler};
use server::game::{DeadBodies, GameConfig, SnakeGame};
use server::lobby::Lobby;
use std::net::Ipv4Addr;

/// Multiplayer snake over raw TCP, played from a terminal
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Port to listen on
    #[clap(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// IPv4 address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: Ipv4Addr,
    /// Maximum number of concurrent players
    #[clap(short, long, default_value = "2")]
    slots: usize,
    /// Simulation steps per second
    #[clap(short, long, default_value = "10")]
    ticks: u32,
    /// Grid width in cells
    #[clap(long, default_value = "40")]
    width: usize,
    /// Grid height in cells
    #[clap(long, default_value = "20")]
    height: usize,
    /// Steps between food spawn attempts
    #[clap(long, default_value = "10")]
    food_interval: u64,
    /// Seed for food placement, random if omitted
    #[clap(long)]
    seed: Option<u64>,
    /// What happens to the body of a dead snake
    #[clap(long, value_enum, default_value = "persist")]
    dead_bodies: DeadBodies,
}

/// Main-method of the application.
/// Parses command-line arguments, builds the game and runs the daemon until Ctrl+C.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let game_config = GameConfig {
        width: args.width,
        height: args.height,
        food_interval: args.food_interval,
        dead_bodies: args.dead_bodies,
    };
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut daemon = Daemon::create(DaemonConfig::new(
        args.host, args.port, args.slots, args.ticks,
    ))?;
    let game = SnakeGame::new(game_config, args.slots, rng)?;

    info!(
        "Snake on a {}x{} grid, food every {} steps, dead bodies {:?}",
        game_config.width, game_config.height, game_config.food_interval, game_config.dead_bodies
    );

    let lobby = Lobby::new(Box::new(move || Box::new(game) as Box<dyn Handler>));

    daemon
        .run_until(Box::new(lobby), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down");
        })
        .await?;

    Ok(())
}
