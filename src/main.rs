use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use lead_desk::config::AppConfig;
use lead_desk::directory::{
    EntityDirectory, EntityId, EntityKind, EntityRecord, MemoryCollection, ReferrerRef,
};
use lead_desk::dispatch::{
    AssignmentDecision, DispatchError, Executive, ExecutiveId, ExecutivePool, LeadType,
    MemoryExecutivePool, RosterImporter,
};
use lead_desk::engine::LeadEngine;
use lead_desk::error::AppError;
use lead_desk::referral::HouseAccount;
use lead_desk::routes::engine_router;
use lead_desk::stats::MemorySnapshotStore;
use lead_desk::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

type AppEngine = LeadEngine<MemoryExecutivePool, MemorySnapshotStore>;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Lead Desk",
    about = "Run the lead dispatch and referral resolution service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Seed a sample brokerage network and walk the dispatch pipeline
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
    /// Seed the executive pool from a roster CSV export
    #[arg(long)]
    roster_csv: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo(),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let pool = Arc::new(MemoryExecutivePool::new());
    if let Some(path) = args.roster_csv.take() {
        let executives = RosterImporter::from_path(&path)?;
        let seeded = executives.len();
        for executive in executives {
            if let Err(err) = pool.insert(executive) {
                warn!(error = %err, "skipping roster row");
            }
        }
        info!(seeded, roster = %path.display(), "executive pool seeded from roster");
    }

    let directory = Arc::new(empty_directory());
    let engine = Arc::new(LeadEngine::new(
        directory,
        pool,
        Arc::new(MemorySnapshotStore::new()),
        HouseAccount {
            referral_code: config.engine.house_referral_code.clone(),
            phone: config.engine.house_phone.clone(),
        },
        config.engine.stats_budget(),
    ));

    spawn_recompute_timer(Arc::clone(&engine), config.engine.stats_interval());

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(engine_router(engine))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lead dispatch engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Directory with every collection registered but empty; registration
/// handlers own entity persistence and fill these in deployment wiring.
fn empty_directory() -> EntityDirectory {
    let mut directory = EntityDirectory::new();
    for kind in [
        EntityKind::Agent,
        EntityKind::Customer,
        EntityKind::CoreMember,
        EntityKind::Investor,
        EntityKind::SkilledLabour,
        EntityKind::Nri,
        EntityKind::Property,
        EntityKind::ApprovedProperty,
    ] {
        directory = directory.register(kind, Arc::new(MemoryCollection::new()));
    }
    directory
}

fn spawn_recompute_timer(engine: Arc<AppEngine>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; skip it so a fresh boot does
        // not race the seeding of collections.
        interval.tick().await;
        loop {
            interval.tick().await;
            match engine.trigger_recompute() {
                Ok(report) => info!(
                    processed = report.processed,
                    failed = report.failed,
                    skipped = report.skipped,
                    "scheduled stats recompute finished"
                ),
                Err(err) => warn!(error = %err, "scheduled stats recompute could not start"),
            }
        }
    });
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn run_demo() -> Result<(), AppError> {
    let agents = Arc::new(MemoryCollection::new());
    let customers = Arc::new(MemoryCollection::new());
    let properties = Arc::new(MemoryCollection::new());

    let mut directory = EntityDirectory::new()
        .register(EntityKind::Agent, agents.clone())
        .register(EntityKind::Customer, customers.clone())
        .register(EntityKind::Property, properties.clone());
    for kind in [
        EntityKind::CoreMember,
        EntityKind::Investor,
        EntityKind::SkilledLabour,
        EntityKind::Nri,
        EntityKind::ApprovedProperty,
    ] {
        directory = directory.register(kind, Arc::new(MemoryCollection::new()));
    }

    agents.insert(EntityRecord {
        id: EntityId("a-1".to_string()),
        kind: EntityKind::Agent,
        display_name: "Asha Rao".to_string(),
        phone: "9000000001".to_string(),
        referral_code: Some("WA123".to_string()),
        referred_by: None,
    });
    customers.insert(EntityRecord {
        id: EntityId("c-1".to_string()),
        kind: EntityKind::Customer,
        display_name: "Vikram Shah".to_string(),
        phone: "9000000002".to_string(),
        referral_code: None,
        referred_by: Some(ReferrerRef::Code("WA123".to_string())),
    });
    properties.insert(EntityRecord {
        id: EntityId("p-1".to_string()),
        kind: EntityKind::Property,
        display_name: "2BHK, Jubilee Hills".to_string(),
        phone: "9000000001".to_string(),
        referral_code: None,
        referred_by: Some(ReferrerRef::Phone("9000000001".to_string())),
    });

    let pool = Arc::new(MemoryExecutivePool::new());
    for executive in [
        Executive::new("e-1", "Arjun Menon", "8000000001", LeadType::Customer),
        Executive::new("e-2", "Divya Nair", "8000000002", LeadType::Customer),
        Executive::new("e-3", "Kiran Rao", "8000000003", LeadType::Agent),
        Executive::new("e-4", "Sneha Iyer", "8000000004", LeadType::Property),
    ] {
        pool.insert(executive).map_err(DispatchError::from)?;
    }

    let engine = LeadEngine::new(
        Arc::new(directory),
        pool.clone(),
        Arc::new(MemorySnapshotStore::new()),
        HouseAccount {
            referral_code: "WA0000000001".to_string(),
            phone: "9666666666".to_string(),
        },
        None,
    );

    println!("Lead dispatch demo");

    println!("\nAutomatic dispatch");
    for (lead_type, lead_id) in [
        (LeadType::Customer, "c-1"),
        (LeadType::Customer, "c-2"),
        (LeadType::Property, "p-1"),
    ] {
        let outcome = engine.assign_lead(lead_type, EntityId(lead_id.to_string()))?;
        match outcome {
            Some(assignment) => println!(
                "- {} lead {} -> {} ({})",
                lead_type.label(),
                lead_id,
                assignment.executive_name,
                assignment.executive_id.0
            ),
            None => println!("- {} lead {} -> unassigned (no capacity)", lead_type.label(), lead_id),
        }
    }

    println!("\nAgent triage");
    let parked = engine.request_agent_assignment(EntityId("a-1".to_string()));
    println!("- agent a-1 parked as {}", parked.status.label());
    let decided = engine
        .decide_agent_assignment(
            &EntityId("a-1".to_string()),
            &ExecutiveId("e-3".to_string()),
            AssignmentDecision::Accept,
        )?;
    println!("- agent a-1 accepted, now {}", decided.status.label());

    println!("\nReferral resolution");
    let resolved = engine.resolve_referrer("9000000002");
    println!(
        "- customer {} was referred by {} ({})",
        resolved.posted_by_name.as_deref().unwrap_or("<unknown>"),
        resolved.referrer_name,
        resolved.referrer_phone
    );

    println!("\nStats recompute");
    let report = engine.trigger_recompute()?;
    println!(
        "- processed {}, failed {}, skipped {}",
        report.processed, report.failed, report.skipped
    );
    if let Ok(Some(snapshot)) = engine.stats_snapshot(&EntityId("a-1".to_string())) {
        println!(
            "- agent a-1: {} referred customers, {} posted properties",
            snapshot.referred_customers, snapshot.posted_properties
        );
    }

    println!("\nExecutive watermarks");
    for id in ["e-1", "e-2", "e-3", "e-4"] {
        if let Ok(Some(executive)) = pool.fetch(&ExecutiveId(id.to_string())) {
            println!(
                "- {} ({}): {} assignment(s), last at {:?}",
                executive.name,
                executive.accepts_type.label(),
                executive.assignments.len(),
                executive.last_assigned_at
            );
        }
    }

    Ok(())
}
