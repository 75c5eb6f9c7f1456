use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trafficwatch_common::{
    Config, GeoPoint, IncidentKind, IncidentStatus, NewIncident, Severity, VoteType,
};
use trafficwatch_engine::{IncidentService, RestProxyPublisher};
use trafficwatch_store::PgIncidentStore;

#[derive(Parser)]
#[command(name = "trafficwatch", about = "Crowd-sourced traffic incident engine")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Report a new incident
    Report {
        #[arg(long = "type")]
        kind: IncidentKind,
        #[arg(long)]
        severity: Severity,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        #[arg(long)]
        description: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        affected_lanes: Option<String>,
        #[arg(long)]
        estimated_duration: Option<String>,
        #[arg(long)]
        reported_by: Option<String>,
    },

    /// Show one incident
    Get { id: String },

    /// List incidents, newest first
    List {
        #[arg(long)]
        status: Vec<IncidentStatus>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Incidents near a point (active only unless --status is given)
    Near {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        #[arg(long)]
        radius_km: Option<f64>,
        #[arg(long)]
        status: Vec<IncidentStatus>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Confirm or dispute an incident
    Vote {
        id: String,
        vote_type: VoteType,
        #[arg(long)]
        voter: Option<String>,
    },

    /// Change an incident's status
    Status {
        id: String,
        status: IncidentStatus,
        #[arg(long)]
        updated_by: Option<String>,
    },

    /// Active incidents along a route of `lat,lng` waypoints
    Route {
        #[arg(long = "point", value_parser = parse_point, allow_hyphen_values = true)]
        points: Vec<GeoPoint>,
        #[arg(long)]
        buffer_km: Option<f64>,
    },
}

fn parse_point(raw: &str) -> Result<GeoPoint, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng but got '{raw}'"))?;
    let lat = lat.trim().parse().map_err(|e| format!("bad latitude '{lat}': {e}"))?;
    let lng = lng.trim().parse().map_err(|e| format!("bad longitude '{lng}': {e}"))?;
    Ok(GeoPoint::new(lat, lng))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("trafficwatch=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = Config::from_env()?;
    config.log_redacted();

    let store = PgIncidentStore::connect(
        config.require_database_url()?,
        config.database_max_connections,
        config.store_timeout,
    )
    .await
    .context("Failed to connect to database")?;

    if let Command::Migrate = cli.command {
        store.migrate().await?;
        info!("Migrations complete");
        return Ok(());
    }

    let mut service = IncidentService::new(Arc::new(store), config.engine.clone());
    match RestProxyPublisher::from_config(&config)? {
        Some(publisher) => {
            info!("Report events enabled");
            service = service.with_publisher(Arc::new(publisher));
        }
        None => info!("No EVENT_PUBLISHER_URL set, report events disabled"),
    }

    let defaults = service.settings().clone();

    match cli.command {
        Command::Migrate => {}

        Command::Report {
            kind,
            severity,
            lat,
            lng,
            description,
            address,
            affected_lanes,
            estimated_duration,
            reported_by,
        } => {
            let new = NewIncident {
                kind,
                severity,
                location: GeoPoint::new(lat, lng),
                description,
                address,
                affected_lanes,
                estimated_duration,
                reported_by,
            };
            let incident = service.report(new).await?;
            service.flush_notifications().await;
            print_json(&incident)?;
        }

        Command::Get { id } => {
            let incident = service
                .get(&id)
                .await?
                .with_context(|| format!("Incident not found: {id}"))?;
            print_json(&incident)?;
        }

        Command::List {
            status,
            limit,
            offset,
        } => {
            let incidents = service
                .list_all(
                    Some(status.as_slice()),
                    limit.unwrap_or(defaults.default_limit),
                    offset,
                )
                .await?;
            print_json(&incidents)?;
        }

        Command::Near {
            lat,
            lng,
            radius_km,
            status,
            limit,
        } => {
            let incidents = service
                .list_near(
                    GeoPoint::new(lat, lng),
                    radius_km.unwrap_or(defaults.default_radius_km),
                    Some(status.as_slice()),
                    limit.unwrap_or(defaults.default_limit),
                )
                .await?;
            print_json(&incidents)?;
        }

        Command::Vote {
            id,
            vote_type,
            voter,
        } => {
            let incident = service.vote(&id, vote_type, voter.as_deref()).await?;
            print_json(&incident)?;
        }

        Command::Status {
            id,
            status,
            updated_by,
        } => {
            let incident = service
                .update_status(&id, status, updated_by.as_deref())
                .await?
                .with_context(|| format!("Incident not found: {id}"))?;
            print_json(&incident)?;
        }

        Command::Route { points, buffer_km } => {
            let incidents = service
                .incidents_along_route(
                    &points,
                    buffer_km.unwrap_or(defaults.default_route_buffer_km),
                )
                .await?;
            print_json(&incidents)?;
        }
    }

    Ok(())
}
