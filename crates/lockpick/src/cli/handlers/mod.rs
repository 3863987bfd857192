use std::{future::Future, io::Write, sync::Arc};

use anyhow::{Context, Result};
use clap::ArgMatches;
use lockpick_core::CoordinationClient;

use crate::{
    cli::{Action, Invocation, Target},
    commands::{acquire, list, unlock},
    config::Config,
    logging::init_tracing,
    signal::Interrupt,
    zk::ZkClient,
};

/// Run one parsed command line against the configured ensemble
///
/// # Errors
///
/// Returns an error when arguments, configuration or the command itself fail
pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let invocation = Invocation::from_matches(matches).map_err(crate::Error::Lock)?;
    init_tracing(invocation.verbosity)?;

    let config = Config::load(invocation.config_file.as_deref(), invocation.flags.clone()).await?;
    tracing::debug!("Using {}", config.connect_string());

    let interrupt = match invocation.action {
        Action::Acquire(_) => Some(Interrupt::install()?),
        Action::Unlock | Action::List => None,
    };

    let client: Arc<dyn CoordinationClient> =
        Arc::new(ZkClient::new(&config.connect_string(), config.session_timeout));
    client.start().await.map_err(crate::Error::Lock)?;

    let mut out = Vec::new();
    let result = execute(
        Arc::clone(&client),
        &config,
        &invocation,
        async move {
            match interrupt {
                Some(interrupt) => interrupt.recv().await,
                None => std::future::pending::<()>().await,
            }
        },
        &mut out,
    )
    .await;

    if let Err(err) = client.stop().await {
        tracing::warn!("Couldn't close session: {err}");
    }

    result?;
    std::io::stdout()
        .write_all(&out)
        .context("Failed to write to stdout")
}

/// Run `invocation` on an open session, writing its result to `out`
///
/// # Errors
///
/// Returns the command's error; nothing is written to `out` in that case
pub async fn execute<C, I>(
    client: Arc<C>,
    config: &Config,
    invocation: &Invocation,
    interrupt: I,
    out: &mut impl Write,
) -> Result<()>
where
    C: CoordinationClient + ?Sized + 'static,
    I: Future<Output = ()>,
{
    match (&invocation.action, &invocation.target) {
        (Action::Acquire(mode), Target::Lock(lock_path)) => {
            let options = acquire::AcquireOptions {
                lock_path: lock_path.clone(),
                mode: *mode,
                identifier: config.identifier.clone(),
                policy: config.retry_policy()?,
                ephemeral: config.ephemeral,
                cleanup_timeout: config.cleanup_timeout,
            };
            acquire::run(client, &options, interrupt, out).await
        }
        (Action::Unlock, Target::Node(node_path)) => {
            unlock::run(&*client, node_path, config.identifier.as_deref()).await
        }
        (Action::List, Target::Lock(lock_path)) => list::run(&*client, lock_path, out).await,
        (action, target) => anyhow::bail!("Action {action:?} does not apply to {target:?}"),
    }
}
