use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::domain::UserId;

use super::slots::{lock, UserSlots};

/// Everything a guard may look at for one inbound invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub text: String,
    /// Present only when the message carries an image attachment.
    pub image_size_bytes: Option<u64>,
    pub is_command: bool,
}

impl RequestContext {
    pub fn message(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            image_size_bytes: None,
            is_command: false,
        }
    }

    pub fn command(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            is_command: true,
            ..Self::message(user_id, text)
        }
    }

    pub fn with_image_size(mut self, bytes: Option<u64>) -> Self {
        self.image_size_bytes = bytes;
        self
    }
}

/// An admission policy. Returns `None` to admit, or the message to show the user.
pub trait Guard: Send + Sync {
    fn check_at(&self, ctx: &RequestContext, now: Instant) -> Option<String>;

    fn check(&self, ctx: &RequestContext) -> Option<String> {
        self.check_at(ctx, Instant::now())
    }

    /// Forget per-user state untouched for longer than `ttl`. Stateless guards ignore this.
    fn evict_idle(&self, _now: Instant, _ttl: Duration) {}
}

// ============== Composite ==============

/// Ordered guard chain; the first violation wins and later guards are not run.
#[derive(Default)]
pub struct CompositeGuard {
    guards: Vec<Box<dyn Guard>>,
}

impl CompositeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.add(guard);
        self
    }

    pub fn add(&mut self, guard: impl Guard + 'static) {
        self.guards.push(Box::new(guard));
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Guard for CompositeGuard {
    fn check_at(&self, ctx: &RequestContext, now: Instant) -> Option<String> {
        self.guards.iter().find_map(|g| g.check_at(ctx, now))
    }

    fn evict_idle(&self, now: Instant, ttl: Duration) {
        for g in &self.guards {
            g.evict_idle(now, ttl);
        }
    }
}

// ============== Rate Limiter (Sliding Window) ==============

/// Admits at most `max_requests` per user in any trailing `window`.
///
/// Rejected attempts are not recorded, so a user who keeps retrying is
/// unblocked as soon as the oldest accepted request leaves the window.
#[derive(Debug)]
pub struct RateLimitGuard {
    max_requests: usize,
    window: Duration,
    buckets: UserSlots<VecDeque<Instant>>,
}

impl RateLimitGuard {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: UserSlots::default(),
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.buckets.len()
    }
}

impl Guard for RateLimitGuard {
    fn check_at(&self, ctx: &RequestContext, now: Instant) -> Option<String> {
        let slot = self.buckets.slot(ctx.user_id);
        let mut bucket = lock(&slot);

        if let Some(cutoff) = now.checked_sub(self.window) {
            bucket.retain(|t| *t >= cutoff);
        }
        if bucket.len() >= self.max_requests {
            return Some(
                "⏳ You are sending messages too quickly. Try again in a few seconds.".to_string(),
            );
        }
        bucket.push_back(now);
        None
    }

    fn evict_idle(&self, now: Instant, ttl: Duration) {
        self.buckets.retain(|bucket| {
            bucket
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) <= ttl)
        });
    }
}

// ============== Message Length ==============

#[derive(Clone, Copy, Debug)]
pub struct MessageLengthGuard {
    max_chars: usize,
}

impl MessageLengthGuard {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Guard for MessageLengthGuard {
    fn check_at(&self, ctx: &RequestContext, _now: Instant) -> Option<String> {
        if ctx.text.chars().count() > self.max_chars {
            return Some(format!(
                "📏 Your message is too long (>{} characters). Please shorten it.",
                self.max_chars
            ));
        }
        None
    }
}

// ============== Image Size ==============

#[derive(Clone, Copy, Debug)]
pub struct ImageSizeGuard {
    max_bytes: u64,
}

impl ImageSizeGuard {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Guard for ImageSizeGuard {
    fn check_at(&self, ctx: &RequestContext, _now: Instant) -> Option<String> {
        match ctx.image_size_bytes {
            Some(size) if size > self.max_bytes => Some(format!(
                "🖼️ The image is too large. Maximum allowed: {}.",
                human_size(self.max_bytes)
            )),
            _ => None,
        }
    }
}

fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{} KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}

// ============== Profanity ==============

/// Case-insensitive substring filter.
#[derive(Clone, Debug)]
pub struct ProfanityGuard {
    banned: Vec<String>,
}

impl ProfanityGuard {
    /// Word list used by [`ProfanityGuard::default`].
    pub const DEFAULT_WORDS: [&'static str; 5] = ["fuck", "shit", "bitch", "pendejo", "mierda"];

    pub fn new(banned: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            banned: banned
                .into_iter()
                .map(|w| w.into().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

impl Default for ProfanityGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORDS)
    }
}

impl Guard for ProfanityGuard {
    fn check_at(&self, ctx: &RequestContext, _now: Instant) -> Option<String> {
        let lower = ctx.text.to_lowercase();
        if self.banned.iter().any(|w| lower.contains(w.as_str())) {
            return Some("🚫 Please avoid offensive language.".to_string());
        }
        None
    }
}

// ============== Command Cooldown ==============

/// Minimum spacing between commands from the same user. Non-command contexts
/// pass without touching state.
#[derive(Debug)]
pub struct CommandCooldownGuard {
    cooldown: Duration,
    last_command: UserSlots<Option<Instant>>,
}

impl CommandCooldownGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_command: UserSlots::default(),
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.last_command.len()
    }
}

impl Guard for CommandCooldownGuard {
    fn check_at(&self, ctx: &RequestContext, now: Instant) -> Option<String> {
        if !ctx.is_command {
            return None;
        }

        let slot = self.last_command.slot(ctx.user_id);
        let mut last = lock(&slot);
        if let Some(prev) = *last {
            // Rejections keep the previous timestamp.
            if now.saturating_duration_since(prev) < self.cooldown {
                return Some("🛑 Don't send commands so often. Wait a moment.".to_string());
            }
        }
        *last = Some(now);
        None
    }

    fn evict_idle(&self, now: Instant, ttl: Duration) {
        let keep_for = ttl.max(self.cooldown);
        self.last_command.retain(|last| {
            last.is_some_and(|t| now.saturating_duration_since(t) <= keep_for)
        });
    }
}
