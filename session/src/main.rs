use clap::Parser;
use log::{error, info, warn};
use rand::Rng;
use session::{GameplayHooks, Info, SessionConfig, TickTrigger};
use shared::{AnnouncementKind, ClientId, MenuState, PlayerInfo, DEFAULT_PORT, MAX_CLIENTS};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless session peer", long_about = None)]
struct Args {
    /// Host a session (the default when --join is not given)
    #[arg(long, conflicts_with = "join")]
    host: bool,

    /// Join the session hosted at this address
    #[arg(short = 'j', long, value_name = "HOST")]
    join: Option<String>,

    /// Port to listen on or connect to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Player name sent to other peers
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Maximum number of clients when hosting
    #[arg(short, long, default_value_t = MAX_CLIENTS)]
    max_clients: usize,

    /// Frames per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// How long to wait for the host to accept us
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Stop after this many seconds (0 runs until the session ends)
    #[arg(short, long, default_value = "0")]
    seconds: u64,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host_name: self
                .join
                .clone()
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port,
            max_clients: self.max_clients,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..SessionConfig::default()
        }
    }
}

/// Walks the local player around a circle and remembers nothing else
struct DemoWorld {
    name: String,
    started: Instant,
    phase: f32,
}

impl DemoWorld {
    const RADIUS: f32 = 3.0;
    const ANGULAR_SPEED: f32 = 0.8;

    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            started: Instant::now(),
            phase: rand::thread_rng().gen_range(0.0..std::f32::consts::TAU),
        }
    }
}

impl GameplayHooks for DemoWorld {
    fn add_new_player(&mut self, origin: ClientId, client_id: ClientId) {
        info!("Spawning player {} (announced by {})", client_id, origin);
    }

    fn remove_player(&mut self, client_id: ClientId) {
        info!("Despawning player {}", client_id);
    }

    fn update_remote_player(
        &mut self,
        _client_id: ClientId,
        _name: &str,
        _location: [f32; 3],
        _facing_direction: i32,
    ) {
    }

    fn player_packet_info(&mut self, my_client_id: ClientId) -> PlayerInfo {
        let angle = self.phase + self.started.elapsed().as_secs_f32() * Self::ANGULAR_SPEED;
        let location = [Self::RADIUS * angle.cos(), 0.0, Self::RADIUS * angle.sin()];
        let facing = (angle.to_degrees() as i32 + 90).rem_euclid(360);
        PlayerInfo::new(my_client_id, &self.name, location, facing)
    }

    fn menu_state(&self) -> MenuState {
        MenuState::Game
    }

    fn apply_host_menu_state(&mut self, state: MenuState) {
        log::trace!("Host menu state {:?}", state);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut session = Info::new(args.session_config(), DemoWorld::new(&args.name));

    match &args.join {
        Some(host) => {
            info!("Joining {}:{} as {}", host, args.port, args.name);
            session.set_role_to_client()?;
        }
        None => {
            info!("Hosting on port {} as {}", args.port, args.name);
            session.set_role_to_host()?;
        }
    }

    let frame = Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32);
    // Cap the frame delta so a stall does not look like a huge step
    let max_delta_time = 1.0 / 20.0;
    let run_for = (args.seconds > 0).then(|| Duration::from_secs(args.seconds));

    let started = Instant::now();
    let mut last_update = started;
    let mut report = TickTrigger::new(Duration::from_secs(1));

    loop {
        std::thread::sleep(frame.saturating_sub(last_update.elapsed()));

        let now = Instant::now();
        let delta_time = (now - last_update).as_secs_f32().min(max_delta_time);
        last_update = now;

        session.network_tick(delta_time);
        for notice in session.take_announcements() {
            match notice.kind {
                AnnouncementKind::Message => info!("{}", notice.message),
                AnnouncementKind::Warning => warn!("{}", notice.message),
                AnnouncementKind::Error => error!("{}", notice.message),
            }
        }

        if !session.has_role() {
            warn!("Session ended");
            break;
        }

        if report.test(delta_time) {
            info!("{}", session.status());
            for (client_id, player) in session.replication().iter() {
                info!(
                    "  player {} '{}' at ({:.1}, {:.1}, {:.1}) facing {}",
                    client_id,
                    player.name,
                    player.position[0],
                    player.position[1],
                    player.position[2],
                    player.facing_direction
                );
            }
        }

        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }

    session.set_role_to_none();
    Ok(())
}
