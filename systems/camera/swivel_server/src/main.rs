//! Camera swivel server binary.
use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use swivel::{components::prelude::*, devices::hardware::broker::BrokerConfig};
use tower_http::services::ServeDir;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Swivel Component. Takes precedence
    /// over the broker flags below.
    #[arg(short, long)]
    filepath: Option<String>,
    /// Host of the camera broker.
    #[arg(long, required_unless_present = "filepath")]
    broker: Option<String>,
    /// Port of the camera broker.
    #[arg(long, default_value_t = 443)]
    port: u16,
    /// Camera identifier on the broker.
    #[arg(long, required_unless_present = "filepath")]
    camera: Option<String>,
    /// Deployment profile, `standard` or `slow`.
    #[arg(long, default_value = "standard")]
    profile: SwivelProfile,
    /// Address the web server binds to.
    #[arg(long, default_value = "0.0.0.0:8000")]
    listen: String,
    /// Directory of static files served for any other path.
    #[arg(long, default_value = "./public")]
    public: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let component = match &args.filepath {
        Some(filepath) => CameraSwivel::from_config_file(filepath)?,
        None => {
            let host = args
                .broker
                .clone()
                .context("--broker is required without a config file")?;
            let camera = args
                .camera
                .clone()
                .context("--camera is required without a config file")?;
            let broker = BrokerConfig::new(host, camera).with_port(args.port);
            CameraSwivel::new(CameraSwivelConfig::with_broker(broker).with_profile(args.profile))?
        }
    };
    let (swivel, control_loop) = CameraSwivelController::start(component);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!("Serving snapshots on {}", args.listen);
    axum::serve(listener, router(swivel.clone(), args.public))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Process terminated");
    swivel.stop().await;
    control_loop.await?;
    Ok(())
}

fn router(swivel: SwivelHandle, public: PathBuf) -> Router {
    Router::new()
        .route("/snapshot/:waypoint", get(snapshot))
        .route("/waypoint", get(waypoint))
        .fallback_service(ServeDir::new(public))
        .with_state(swivel)
}

async fn snapshot(State(swivel): State<SwivelHandle>, Path(waypoint): Path<String>) -> Response {
    snapshot_response(swivel.get_snapshot(waypoint_label(&waypoint)))
}

async fn waypoint(State(swivel): State<SwivelHandle>) -> Response {
    waypoint_response(swivel.get_waypoint())
}

/// Browsers ask for `{waypoint}.jpg`, the extension is not part of the label.
fn waypoint_label(path: &str) -> &str {
    path.strip_suffix(".jpg").unwrap_or(path)
}

/// Latest image as png, or an empty body before the first capture.
fn snapshot_response(snapshot: Option<Snapshot>) -> Response {
    match snapshot {
        Some(snapshot) => {
            let modified = snapshot
                .captured_at
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string();
            (
                [
                    (header::CONTENT_TYPE, "image/png".to_string()),
                    (header::LAST_MODIFIED, modified),
                ],
                snapshot.image,
            )
                .into_response()
        }
        None => (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")]).into_response(),
    }
}

fn waypoint_response(waypoint: Option<WaypointId>) -> Response {
    let body = waypoint.map(|w| w.to_string()).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

/// Resolves on ctrl-c, SIGTERM or SIGQUIT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    _ = term.recv() => {},
                    _ = quit.recv() => {},
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
