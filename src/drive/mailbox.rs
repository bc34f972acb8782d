// Single-slot command handoff between the intake task and the control loop
//
// Triple buffer: the sender owns one slot, the receiver owns one slot and the
// third sits in the middle. Both sides trade their slot for the middle one with
// a single atomic swap, so neither side ever waits on the other and a command
// is always read as a whole value.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

/// Desired body-frame velocity, stamped when it entered the runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
    pub timestamp: Instant,
}

impl VelocityCommand {
    pub fn new(linear_x: f64, linear_y: f64, angular_z: f64, timestamp: Instant) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
            timestamp,
        }
    }

    pub fn zero(timestamp: Instant) -> Self {
        Self::new(0.0, 0.0, 0.0, timestamp)
    }

    pub fn is_finite(&self) -> bool {
        self.linear_x.is_finite() && self.linear_y.is_finite() && self.angular_z.is_finite()
    }

    /// Age at `now`; zero if the command is stamped in the future
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}

const INDEX_MASK: u8 = 0b011;
const FRESH: u8 = 0b100;

struct Slots {
    buffers: [UnsafeCell<VelocityCommand>; 3],
    // Index of the middle buffer, plus FRESH when it holds an unread command
    middle: AtomicU8,
}

// Each buffer index is owned by exactly one of sender, receiver or the middle
// slot at any time; ownership only moves through the `middle` swap.
unsafe impl Sync for Slots {}

/// Producer half. Send it to whichever task receives commands.
pub struct CommandSender {
    slots: Arc<Slots>,
    write: u8,
}

/// Consumer half, owned by the control loop
pub struct CommandReceiver {
    slots: Arc<Slots>,
    read: u8,
}

/// Create a connected sender/receiver pair. Allocates once, here.
pub fn channel() -> (CommandSender, CommandReceiver) {
    let init = VelocityCommand::zero(Instant::now());
    let slots = Arc::new(Slots {
        buffers: [
            UnsafeCell::new(init),
            UnsafeCell::new(init),
            UnsafeCell::new(init),
        ],
        middle: AtomicU8::new(1),
    });
    (
        CommandSender {
            slots: slots.clone(),
            write: 0,
        },
        CommandReceiver { slots, read: 2 },
    )
}

impl CommandSender {
    /// Publish a command, replacing any that has not been taken yet.
    /// Non-finite commands are dropped and `false` is returned.
    pub fn publish(&mut self, cmd: VelocityCommand) -> bool {
        if !cmd.is_finite() {
            warn!("Dropping non-finite velocity command: {:?}", cmd);
            return false;
        }

        // SAFETY: `write` is owned by this sender until it is swapped out below
        unsafe {
            *self.slots.buffers[self.write as usize].get() = cmd;
        }
        let prev = self.slots.middle.swap(self.write | FRESH, Ordering::AcqRel);
        self.write = prev & INDEX_MASK;
        true
    }
}

impl CommandReceiver {
    /// Take the command published since the last call, if any. Never blocks.
    pub fn take(&mut self) -> Option<VelocityCommand> {
        if self.slots.middle.load(Ordering::Relaxed) & FRESH == 0 {
            return None;
        }
        let prev = self.slots.middle.swap(self.read, Ordering::AcqRel);
        self.read = prev & INDEX_MASK;
        // SAFETY: `read` was just handed over by the swap and is owned by this receiver
        Some(unsafe { *self.slots.buffers[self.read as usize].get() })
    }

    /// Discard anything pending
    pub fn clear(&mut self) {
        let _ = self.take();
    }
}
