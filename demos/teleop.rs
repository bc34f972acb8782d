// Keyboard teleop for the mecanum base
//
// W/S forward/back, A/D strafe, Z/X rotate, R/F change speed, space stops, Q quits.
// Publishes a velocity command every 20ms; axes fall back to zero when no key
// has touched them for a while.

use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::info;

use mecanum_zenoh_runtime::config::TOPIC_CMD_BASE;
use mecanum_zenoh_runtime::messages::TwistCommand;

const LINEAR_SPEEDS: [f64; 3] = [0.1, 0.25, 0.5]; // m/s
const ANGULAR_SPEEDS: [f64; 3] = [0.3, 0.8, 1.6]; // rad/s
const SPEED_LABELS: [&str; 3] = ["LOW", "MED", "HIGH"];
const HOLD_TIMEOUT: Duration = Duration::from_millis(100);
const PUBLISH_PERIOD: Duration = Duration::from_millis(20);

/// Key-driven command with a hold timeout
struct Motion {
    level: usize,
    cmd: TwistCommand,
    touched: Instant,
}

enum Action {
    Continue,
    Quit,
}

impl Motion {
    fn new() -> Self {
        Self {
            level: 0,
            cmd: TwistCommand::default(),
            touched: Instant::now(),
        }
    }

    fn press(&mut self, code: KeyCode) -> Action {
        let v = LINEAR_SPEEDS[self.level];
        let w = ANGULAR_SPEEDS[self.level];
        match code {
            KeyCode::Char('w') => self.set(|c| c.linear_x = v),
            KeyCode::Char('s') => self.set(|c| c.linear_x = -v),
            KeyCode::Char('a') => self.set(|c| c.linear_y = v),
            KeyCode::Char('d') => self.set(|c| c.linear_y = -v),
            KeyCode::Char('z') => self.set(|c| c.angular_z = w),
            KeyCode::Char('x') => self.set(|c| c.angular_z = -w),
            KeyCode::Char(' ') => self.cmd = TwistCommand::default(),
            KeyCode::Char('r') => self.shift(1),
            KeyCode::Char('f') => self.shift(-1),
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            _ => {}
        }
        Action::Continue
    }

    fn set(&mut self, f: impl FnOnce(&mut TwistCommand)) {
        f(&mut self.cmd);
        self.touched = Instant::now();
    }

    fn shift(&mut self, step: isize) {
        self.level = self.level.saturating_add_signed(step).min(LINEAR_SPEEDS.len() - 1);
        info!("Speed: {}", SPEED_LABELS[self.level]);
    }

    /// Command to send now
    fn current(&mut self) -> TwistCommand {
        if self.touched.elapsed() > HOLD_TIMEOUT {
            self.cmd = TwistCommand::default();
        }
        self.cmd
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_BASE).await?;

    info!("Controls: W/S drive, A/D strafe, Z/X rotate, R/F speed, space stop, Q quit");
    info!("Speed: {}", SPEED_LABELS[0]);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut motion = Motion::new();

    loop {
        if event::poll(PUBLISH_PERIOD)? {
            if let Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press | KeyEventKind::Repeat,
                ..
            }) = event::read()?
            {
                if let Action::Quit = motion.press(code) {
                    break;
                }
            }
        }

        publisher
            .put(serde_json::to_string(&motion.current())?)
            .await?;
    }

    // Leave the base stopped
    publisher
        .put(serde_json::to_string(&TwistCommand::default())?)
        .await?;
    Ok(())
}
