use std::{sync::Arc, time::Instant};

use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    types::BotCommand, update_listeners::Polling,
};

use ltb_core::{
    config::Config,
    pipeline::Pipeline,
    security::{self, CompositeGuard, CompositeSanitizer, Guard},
    settings::SettingsStore,
};

use crate::handlers;

pub struct AppState {
    pub cfg: Arc<Config>,
    pub settings: Arc<dyn SettingsStore>,
    pub pipeline: Arc<Pipeline>,
    pub message_guard: CompositeGuard,
    pub command_guard: CompositeGuard,
    pub sanitizer: CompositeSanitizer,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, settings: Arc<dyn SettingsStore>, pipeline: Arc<Pipeline>) -> Self {
        let message_guard = security::message_guard(&cfg);
        let command_guard = security::command_guard(&cfg);
        tracing::info!(
            message_guards = message_guard.len(),
            command_guards = command_guard.len(),
            "guard chains built"
        );
        Self {
            message_guard,
            command_guard,
            sanitizer: security::input_sanitizer(),
            cfg,
            settings,
            pipeline,
        }
    }

    /// Drops per-user guard state idle for longer than the configured TTL.
    pub fn sweep_guards(&self, now: Instant) {
        let ttl = self.cfg.guard_idle_ttl;
        self.message_guard.evict_idle(now, ttl);
        self.command_guard.evict_idle(now, ttl);
    }
}

/// Entries shown in the Telegram command menu.
pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Show the welcome message and setup buttons"),
        BotCommand::new("set_api_key", "Set your provider API key"),
        BotCommand::new("set_base_url", "Set the provider base URL"),
        BotCommand::new("set_model", "Set the model name"),
        BotCommand::new("set_system_prompt", "Set the system prompt"),
        BotCommand::new("config_status", "Show your current configuration"),
    ]
}

pub async fn run_polling(
    cfg: Arc<Config>,
    settings: Arc<dyn SettingsStore>,
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        tracing::warn!(error = %e, "failed to register the command menu");
    }

    let state = Arc::new(AppState::new(cfg.clone(), settings, pipeline));

    {
        let state = state.clone();
        let every = cfg.guard_sweep_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            // The first tick completes immediately.
            tick.tick().await;
            loop {
                tick.tick().await;
                state.sweep_guards(Instant::now());
                tracing::debug!("guard state swept");
            }
        });
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    // Updates queued while the bot was down are discarded.
    let listener = Polling::builder(bot.clone())
        .drop_pending_updates()
        .build();

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        terminate_signal().await;
        tracing::info!("received terminate signal, shutting down");
        match shutdown.shutdown() {
            Ok(done) => done.await,
            Err(e) => tracing::warn!(error = ?e, "dispatcher was not running"),
        }
    });

    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener error"),
        )
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}

/// Resolves on SIGTERM. Ctrl-C is handled by the dispatcher itself.
async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminate_signal_waits_for_the_signal() {
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), terminate_signal()).await;
        assert!(waited.is_err(), "resolved without a signal");
    }

    #[test]
    fn command_menu_matches_handled_commands() {
        let names: Vec<String> = bot_commands().into_iter().map(|c| c.command).collect();
        assert_eq!(
            names,
            [
                "start",
                "set_api_key",
                "set_base_url",
                "set_model",
                "set_system_prompt",
                "config_status"
            ]
        );
    }
}
