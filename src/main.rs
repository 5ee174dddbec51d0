use std::{future::IntoFuture, process, sync::Arc};

use tallybot::{
    application::{
        dispatcher::{CommandContext, CommandDispatcher, DispatchSettings},
        error::AppError,
        messenger::Messenger,
        repos::{DictionaryRepo, UsageRepo},
    },
    cache::{
        CacheConfig, DisabledCache, KeywordCache, MemoryKeywordCache, MemoryNameCache, NameCache,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        line::LineMessenger,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "tallybot::migrate", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let channel_secret = required(settings.line.channel_secret.as_deref(), "line.channel_secret")?;
    let channel_token = required(settings.line.channel_token.as_deref(), "line.channel_token")?;

    let repositories = init_repositories(&settings).await?;
    let messenger: Arc<dyn Messenger> = Arc::new(
        LineMessenger::new(settings.line.api_base_url.clone(), channel_token)
            .map_err(AppError::from)?,
    );

    let dispatcher = CommandDispatcher::new(build_command_context(
        repositories.clone(),
        messenger,
        &settings,
    ));

    let state = HttpState {
        dispatcher: Arc::new(dispatcher),
        channel_secret: Arc::from(channel_secret),
        db: repositories,
    };

    serve_http(&settings, state).await
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, AppError> {
    value
        .ok_or_else(|| InfraError::configuration(format!("{key} is not configured")))
        .map_err(AppError::from)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = required(settings.database.url.as_deref(), "database.url")?;

    let repositories = PostgresRepositories::open(database_url, &settings.database)
        .await
        .map_err(AppError::from)?;
    Ok(Arc::new(repositories))
}

fn build_command_context(
    repositories: Arc<PostgresRepositories>,
    messenger: Arc<dyn Messenger>,
    settings: &config::Settings,
) -> CommandContext {
    let dictionary: Arc<dyn DictionaryRepo> = repositories.clone();
    let usage: Arc<dyn UsageRepo> = repositories;

    let cache_config = CacheConfig::from(&settings.cache);
    let (keywords, names): (Arc<dyn KeywordCache>, Arc<dyn NameCache>) =
        if cache_config.is_enabled() {
            (
                Arc::new(MemoryKeywordCache::new(&cache_config)),
                Arc::new(MemoryNameCache::new(&cache_config)),
            )
        } else {
            warn!(target = "tallybot::cache", "In-process caches disabled");
            (Arc::new(DisabledCache), Arc::new(DisabledCache))
        };

    CommandContext {
        dictionary,
        usage,
        keywords,
        names,
        messenger,
        settings: DispatchSettings {
            rules: settings.commands.rules,
            highscore_window: settings.commands.highscore_window,
            display_name_ttl: cache_config.display_name_ttl(),
        },
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "tallybot::serve",
        addr = %settings.server.addr,
        "Listening for webhooks"
    );

    let grace = settings.server.graceful_shutdown;
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!(target = "tallybot::serve", "Shutdown requested");
            let _ = stop_tx.send(true);
        })
        .into_future();

    // in-flight webhooks get `grace` to finish once shutdown starts
    let deadline = async move {
        if stop_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = deadline => {
            warn!(
                target = "tallybot::serve",
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out"
            );
        }
    }

    Ok(())
}
