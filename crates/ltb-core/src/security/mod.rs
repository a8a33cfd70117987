//! Admission control for inbound messages and commands.
//!
//! Text is normalized by a [`Sanitizer`] chain before any [`Guard`] sees it.
//! Both chains are plain values built once at startup and shared behind `Arc`.

mod guards;
mod sanitize;
mod slots;

pub use guards::{
    CommandCooldownGuard, CompositeGuard, Guard, ImageSizeGuard, MessageLengthGuard,
    ProfanityGuard, RateLimitGuard, RequestContext,
};
pub use sanitize::{
    CompositeSanitizer, ControlCharsSanitizer, MarkdownEscapeSanitizer, Sanitizer, TrimSanitizer,
};

use crate::config::Config;

/// Chain applied to every free-text/photo message: rate limit, length, image size,
/// then the profanity filter when banned words are configured. The single word
/// `default` selects [`ProfanityGuard::DEFAULT_WORDS`].
pub fn message_guard(cfg: &Config) -> CompositeGuard {
    let mut chain = CompositeGuard::new()
        .with(RateLimitGuard::new(
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ))
        .with(MessageLengthGuard::new(cfg.max_message_chars))
        .with(ImageSizeGuard::new(cfg.max_image_bytes));
    match cfg.banned_words.as_slice() {
        [] => {}
        [only] if only == "default" => chain.add(ProfanityGuard::default()),
        words => chain.add(ProfanityGuard::new(words.iter().cloned())),
    }
    chain
}

/// Chain applied to configuration commands.
pub fn command_guard(cfg: &Config) -> CompositeGuard {
    CompositeGuard::new().with(CommandCooldownGuard::new(cfg.command_cooldown))
}

/// Normalization applied to inbound text. Control characters go first so that
/// whitespace they were hiding gets trimmed in the same pass. Markdown escaping
/// is absent: model input stays raw.
pub fn input_sanitizer() -> CompositeSanitizer {
    CompositeSanitizer::new()
        .with(ControlCharsSanitizer)
        .with(TrimSanitizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use std::time::{Duration, Instant};

    #[test]
    fn message_chain_order_is_rate_then_length_then_image() {
        let cfg = Config {
            rate_limit_requests: 1,
            max_message_chars: 3,
            max_image_bytes: 10,
            ..Config::default()
        };
        let chain = message_guard(&cfg);
        let now = Instant::now();
        let u = UserId(5);

        // Length and image both violate; length is reported first.
        let ctx = RequestContext::message(u, "toolong").with_image_size(Some(11));
        let msg = chain.check_at(&ctx, now).unwrap();
        assert!(msg.contains("too long"), "{msg}");

        // The rate limiter recorded the first attempt, so it now wins.
        let msg = chain.check_at(&ctx, now).unwrap();
        assert!(msg.contains("too quickly"), "{msg}");
    }

    #[test]
    fn profanity_guard_only_wired_when_configured() {
        let u = UserId(6);
        let now = Instant::now();
        let ctx = RequestContext::message(u, "well, damn");

        let plain = message_guard(&Config::default());
        assert_eq!(plain.len(), 3);
        assert_eq!(plain.check_at(&ctx, now), None);

        let strict = message_guard(&Config {
            banned_words: vec!["damn".to_string()],
            ..Config::default()
        });
        assert!(strict.check_at(&ctx, now + Duration::from_secs(1)).is_some());
    }

    #[test]
    fn banned_words_default_selects_builtin_list() {
        let chain = message_guard(&Config {
            banned_words: vec!["default".to_string()],
            ..Config::default()
        });
        assert_eq!(chain.len(), 4);
        let now = Instant::now();
        let u = UserId(8);
        assert!(chain
            .check_at(&RequestContext::message(u, "qué MIERDA"), now)
            .is_some());
        assert_eq!(
            chain.check_at(
                &RequestContext::message(u, "default"),
                now + Duration::from_secs(1)
            ),
            None
        );
    }

    #[test]
    fn command_chain_ignores_plain_messages() {
        let chain = command_guard(&Config::default());
        let now = Instant::now();
        let u = UserId(7);
        for _ in 0..5 {
            assert_eq!(chain.check_at(&RequestContext::message(u, "hi"), now), None);
        }
        assert_eq!(chain.check_at(&RequestContext::command(u, "/start"), now), None);
        assert!(chain
            .check_at(&RequestContext::command(u, "/start"), now)
            .is_some());
    }

    #[test]
    fn input_sanitizer_trims_and_strips() {
        let s = input_sanitizer();
        assert_eq!(s.sanitize("  he\u{0}llo\u{7} \n"), "hello");
        assert_eq!(s.sanitize("\u{1} hi \u{1}"), "hi");
    }
}
