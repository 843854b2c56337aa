use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::common::MessageDraft;
use crate::room::RoomChannel;

pub const DEFAULT_BOT_INTERVAL: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeUser {
    pub id: &'static str,
    pub name: &'static str,
    pub color: &'static str,
}

pub const FAKE_USERS: [FakeUser; 10] = [
    FakeUser { id: "alice", name: "Alice", color: "#F56565" },
    FakeUser { id: "bob", name: "Bob", color: "#48BB78" },
    FakeUser { id: "charlie", name: "Charlie", color: "#4299E1" },
    FakeUser { id: "dana", name: "Dana", color: "#ED8936" },
    FakeUser { id: "rachel", name: "Rachel", color: "#9F7AEA" },
    FakeUser { id: "tom", name: "Tom", color: "#ECC94B" },
    FakeUser { id: "lisa", name: "Lisa", color: "#34D399" },
    FakeUser { id: "mark", name: "Mark", color: "#60A5FA" },
    FakeUser { id: "nina", name: "Nina", color: "#FBBF24" },
    FakeUser { id: "john", name: "John", color: "#A78BFA" },
];

pub const FAKE_MESSAGES: [&str; 8] = [
    "Hello there!",
    "How’s your day going?",
    "Rust is awesome!",
    "Anyone here?",
    "Testing... 1, 2, 3...",
    "🔥🔥🔥",
    "I love coding!",
    "Did you see the game last night?",
];

/// Pick one fake user and one utterance, uniformly and with replacement.
pub fn random_draft<R: Rng + ?Sized>(rng: &mut R) -> MessageDraft {
    let user = FAKE_USERS.choose(rng).copied().unwrap_or(FAKE_USERS[0]);
    let text = FAKE_MESSAGES.choose(rng).copied().unwrap_or(FAKE_MESSAGES[0]);
    MessageDraft {
        text: text.to_string(),
        author_id: user.id.to_string(),
        author_display_name: user.name.to_string(),
        author_color: user.color.to_string(),
        is_summary: false,
    }
}

/// Timer that posts canned chatter into the room. At most one timer runs;
/// appends are not retried and failures are only logged.
pub struct SimulatedParticipants {
    room: RoomChannel,
    interval: Duration,
    seed: Option<u64>,
    active: Mutex<Option<CancellationToken>>,
}

impl SimulatedParticipants {
    pub fn new(room: RoomChannel, interval: Duration) -> Self {
        Self {
            room,
            interval,
            seed: None,
            active: Mutex::new(None),
        }
    }

    /// Deterministic picks, for tests and demos.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// Start posting every `interval`. Returns false if a timer was already
    /// running, in which case nothing changes.
    pub fn start(&self) -> bool {
        let mut slot = self.slot();
        if slot.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        tokio::spawn(run_timer(self.room.clone(), self.interval, rng, token.clone()));
        *slot = Some(token);
        log::info!("Bot started ({}ms interval)", self.interval.as_millis());
        true
    }

    /// Cancel the timer. Returns false if none was running.
    pub fn stop(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                token.cancel();
                log::info!("Bot stopped");
                true
            }
            None => false,
        }
    }

    /// Flip the bot on or off and return the new state.
    pub fn toggle(&self) -> bool {
        if self.stop() {
            false
        } else {
            self.start();
            true
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SimulatedParticipants {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer(room: RoomChannel, interval: Duration, mut rng: StdRng, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let draft = random_draft(&mut rng);
                if let Err(err) = room.append(&draft).await {
                    log::warn!("Bot message from {} dropped: {err}", draft.author_display_name);
                }
            }
        }
    }
}
