use crate::output::{print_json, print_table};
use amaplayer_actions::{EntityState, OptimisticStore, Outcome, ScriptedBackend};
use amaplayer_core::config::PipelineConfig;
use amaplayer_core::{ErrorKind, RawError};
use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::path::Path;

#[derive(Args)]
pub struct SimulateArgs {
    /// Entity key to toggle
    #[arg(long, default_value = "post-1")]
    key: String,
    /// Value the UI currently shows
    #[arg(long, default_value_t = false)]
    current: bool,
    /// Failures the backend returns before succeeding, in order
    /// (e.g. network,timeout)
    #[arg(long, value_delimiter = ',')]
    fail: Vec<ErrorKind>,
    /// Message attached to each scripted failure
    #[arg(long)]
    message: Option<String>,
    /// Value the backend reports on success (default: the requested value)
    #[arg(long)]
    resolve: Option<bool>,
    /// Number of rapid toggles to issue inside one debounce window
    #[arg(long, default_value_t = 1)]
    toggles: u32,
}

#[derive(Serialize)]
struct WriteRow {
    desired: bool,
    at_ms: u128,
}

#[derive(Serialize)]
struct Report {
    key: String,
    tentative: EntityState<bool>,
    #[serde(rename = "final")]
    settled: Option<EntityState<bool>>,
    writes: Vec<WriteRow>,
    delays_ms: Vec<u128>,
}

/// A representative backend code for each kind.
fn raw_for(kind: ErrorKind, message: Option<&str>) -> RawError {
    let code = match kind {
        ErrorKind::Network => "unavailable",
        ErrorKind::Timeout => "deadline-exceeded",
        ErrorKind::InvalidInput => "invalid-argument",
        ErrorKind::RateLimited => "resource-exhausted",
        ErrorKind::PermissionDenied => "permission-denied",
        ErrorKind::Unknown => "internal",
    };
    RawError {
        code: Some(code.to_string()),
        message: message.map(str::to_string),
    }
}

pub fn run(root: &Path, args: SimulateArgs, json: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root).context("failed to load config")?;

    let mut outcomes: Vec<Outcome<bool>> = args
        .fail
        .iter()
        .map(|&k| Outcome::Fail(raw_for(k, args.message.as_deref())))
        .collect();
    if let Some(v) = args.resolve {
        outcomes.push(Outcome::Resolve(v));
    }
    let backend = ScriptedBackend::new(outcomes);

    // One thread, like the UI event loop the pipeline is designed for.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let report = rt.block_on(drive(&config, backend, &args))?;

    if json {
        return print_json(&report);
    }

    println!("key:       {}", report.key);
    println!("tentative: {}", describe(&report.tentative));
    match &report.settled {
        Some(state) => println!("final:     {}", describe(state)),
        None => println!("final:     (unknown key)"),
    }
    println!();
    let rows = report
        .writes
        .iter()
        .enumerate()
        .map(|(i, w)| {
            vec![
                (i + 1).to_string(),
                w.desired.to_string(),
                format!("{}ms", w.at_ms),
            ]
        })
        .collect();
    print_table(&["ATTEMPT", "DESIRED", "AT"], rows);
    Ok(())
}

async fn drive(
    config: &PipelineConfig,
    backend: ScriptedBackend<bool>,
    args: &SimulateArgs,
) -> anyhow::Result<Report> {
    let store = OptimisticStore::new(backend.clone(), config)?;
    let start = tokio::time::Instant::now();
    let gap = config.debounce.window() / 4;

    let mut shown = args.current;
    let mut tentative = store.toggle(&args.key, shown);
    for _ in 1..args.toggles.max(1) {
        tokio::time::sleep(gap).await;
        shown = tentative.committed;
        tentative = store.toggle(&args.key, shown);
    }
    let settled = store.settled(&args.key).await;

    let calls = backend.calls();
    let delays_ms = calls
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis())
        .collect();
    let writes = calls
        .iter()
        .map(|c| WriteRow {
            desired: c.desired,
            at_ms: (c.at - start).as_millis(),
        })
        .collect();

    Ok(Report {
        key: args.key.clone(),
        tentative,
        settled,
        writes,
        delays_ms,
    })
}

fn describe(state: &EntityState<bool>) -> String {
    let mut out = format!("committed={} loading={}", state.committed, state.loading);
    if let Some(err) = &state.error {
        out.push_str(&format!(" error={err:?}"));
    }
    out
}
