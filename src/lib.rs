// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, build_workflow, load_and_validate, resolve_root};
use crate::control::{
    ControlContext, DEFAULT_RPC_ADDR, Driver, DriverOptions, RpcServer, send_stop,
    spawn_ctrl_c_handler,
};
use crate::dag::Workflow;
use crate::engine::{HistoryStore, JsonlHistory, MemoryHistory, Orchestrator, OrchestratorOptions};
use crate::exec::ProcessExecutor;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the task graph
/// - job history
/// - orchestrator / process executor
/// - the control server and Ctrl-C handling
/// - the cycle driver
pub async fn run(args: CliArgs) -> Result<()> {
    if args.stop {
        let addr = stop_target(&args);
        info!(addr = %addr, "asking running instance to stop");
        send_stop(&addr).await?;
        println!("stop requested at {addr}");
        return Ok(());
    }

    let cfg = load_and_validate(&args.config)?;

    let history = open_history(&cfg);
    let mut workflow = build_workflow(&cfg, &history);
    let root = resolve_root(&cfg, args.task.as_deref(), &mut workflow)?;
    let workflow = Arc::new(workflow);
    let options = OrchestratorOptions {
        needs_update_default: cfg.config.needs_update_default,
    };

    if args.dry_run {
        print_dry_run(&workflow, &root, options)?;
        return Ok(());
    }

    let executor = ProcessExecutor::new(cfg.config.output_dir.clone())
        .with_stop_grace(cfg.config.stop_grace_period.as_duration());
    let orchestrator = Arc::new(Orchestrator::new(
        workflow,
        Arc::new(executor),
        history,
        options,
    ));

    let ctx = Arc::new(ControlContext::new());

    let rpc_addr = args
        .rpc_addr
        .clone()
        .unwrap_or_else(|| cfg.config.rpc_addr.clone());
    let server = RpcServer::bind(&rpc_addr, Arc::clone(&ctx)).await?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve().await {
            error!(error = %e, "control server stopped");
        }
    });

    let signal_task = spawn_ctrl_c_handler(Arc::clone(&ctx));

    let driver = Driver::new(
        orchestrator,
        ctx,
        root,
        DriverOptions {
            once: args.once,
            idle_fallback: cfg.config.idle_fallback.as_duration(),
            retry_delay: cfg.config.retry_delay.as_duration(),
        },
    );
    let result = driver.run().await;

    server_task.abort();
    signal_task.abort();

    let cycles = result?;
    info!(cycles, "workflow runner exiting");
    Ok(())
}

/// `--rpc-addr`, else the config's address when it loads, else the default.
fn stop_target(args: &CliArgs) -> String {
    if let Some(addr) = &args.rpc_addr {
        return addr.clone();
    }
    match load_and_validate(&args.config) {
        Ok(cfg) => cfg.config.rpc_addr,
        Err(e) => {
            debug!(error = %e, "no usable config; using the default control address");
            DEFAULT_RPC_ADDR.to_string()
        }
    }
}

fn open_history(cfg: &ConfigFile) -> Arc<dyn HistoryStore> {
    match &cfg.config.history_file {
        Some(path) => {
            info!(path = %path.display(), "recording job history");
            Arc::new(JsonlHistory::new(path.clone()))
        }
        None => {
            info!("no history_file configured; job history is kept in memory");
            Arc::new(MemoryHistory::new())
        }
    }
}

/// Print tasks and the rounds the next cycle would run. Freshness
/// predicates are evaluated, so sources read the job history.
fn print_dry_run(workflow: &Workflow, root: &str, options: OrchestratorOptions) -> Result<()> {
    println!("workflow-runner dry-run");
    println!("  root = {root}");
    println!("  needs_update_default = {}", options.needs_update_default);
    println!();

    println!("tasks ({}):", workflow.len());
    for node in workflow.nodes() {
        println!("  - {}", node.name);
        if !node.description.is_empty() {
            println!("      description: {}", node.description);
        }
        match &node.command {
            Some(argv) => println!("      cmd: {argv:?}"),
            None if node.is_grouping() => println!("      (grouping)"),
            None => {}
        }
        if !node.dependencies.is_empty() {
            println!("      after: {:?}", node.dependencies);
        }
        if let Some(interval) = node.refresh_interval {
            println!(
                "      refresh_interval: {}",
                crate::types::HumanDuration(interval)
            );
        }
    }
    println!();

    let plan = crate::dag::plan(workflow, root, options.needs_update_default)?;
    if plan.is_empty() {
        println!("nothing to run: every task is fresh");
    }
    for (idx, round) in plan.rounds().iter().enumerate() {
        println!("step {idx}: {}", round.join(", "));
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
