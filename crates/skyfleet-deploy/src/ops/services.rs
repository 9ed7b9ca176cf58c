//! Reachability checks and service scripts

use crate::context::TaskContext;
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_core::ServicePhase;

/// Ping attempts made before installing services on a fresh host
const INSTALL_PING_ATTEMPTS: u32 = 5;

pub async fn ping(ctx: &TaskContext, log: &mut LogBuilder, nickname: &str) -> Result<()> {
    ping_times(ctx, log, nickname, ctx.options.ping_repetitions).await
}

async fn ping_times(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    nickname: &str,
    attempts: u32,
) -> Result<()> {
    let def = ctx.instance(nickname)?;
    let host = ctx.host_of(def)?;
    let mut result = ctx
        .shell()?
        .ping(host, attempts, ctx.options.ping_pause)
        .await;
    log.add(result.to_string());
    match result.error.take() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

pub async fn install(ctx: &TaskContext, log: &mut LogBuilder, nickname: &str) -> Result<()> {
    ping_times(ctx, log, nickname, INSTALL_PING_ATTEMPTS).await?;
    run_phase(ctx, log, nickname, ServicePhase::Install).await
}

/// Run the instance's scripts for `phase` in order, stopping at the first failure
pub async fn run_phase(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    nickname: &str,
    phase: ServicePhase,
) -> Result<()> {
    let def = ctx.instance(nickname)?;
    let scripts = def.service.cmd.scripts(phase);
    if scripts.is_empty() {
        log.add(format!("no {} scripts for {}", phase, nickname));
        return Ok(());
    }

    let host = ctx.host_of(def)?;
    let shell = ctx.shell()?;
    for script in scripts {
        let path = ctx.project.scripts_path().join(script);
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DeployError::Script {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let mut result = shell.exec_script(host, &def.service.env, &body).await;
        log.add(result.to_string());
        if let Some(e) = result.error.take() {
            log.add(format!("{} failed on {}", script, host));
            return Err(e.into());
        }
    }
    Ok(())
}
