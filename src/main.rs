use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use attendance::attendance::face::HistogramComparer;
use attendance::attendance::schedule::PeriodSchedule;
use attendance::attendance::{AttendanceEventKind, AttendanceService};
use attendance::config::Config;
use attendance::db::init_db;
use attendance::docs::ApiDoc;
use attendance::routes;
use attendance::store::{AttendanceStore, MemoryStore, MySqlStore};

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service"
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn AttendanceStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = init_db(url)
                .await
                .context("failed to connect to the attendance database")?;
            info!("Using MySQL attendance store");
            Ok(Arc::new(MySqlStore::new(pool)))
        }
        None if config.seed_demo_data => {
            warn!("DATABASE_URL not set, using in-memory store with demo data");
            Ok(Arc::new(MemoryStore::with_demo_data(
                chrono::Local::now().date_naive(),
            )))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_schedule(config: &Config) -> anyhow::Result<PeriodSchedule> {
    match &config.periods_file {
        Some(path) => PeriodSchedule::load(path)
            .with_context(|| format!("failed to load periods from {path}")),
        None => {
            warn!("PERIODS_FILE not set, no periods scheduled");
            Ok(PeriodSchedule::default())
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let store = build_store(&config).await?;
    let schedule = Arc::new(build_schedule(&config)?);
    info!(periods = schedule.periods().len(), "Period schedule ready");

    let service = Data::new(
        AttendanceService::new(
            store,
            schedule,
            Arc::new(HistogramComparer),
            config.location_settings(),
        )
        .with_session_idle(config.session_idle),
    );

    let mut events = service.subscribe();
    actix_web::rt::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let period_id = match event.kind {
                        AttendanceEventKind::PeriodMarked { period_id } => Some(period_id),
                        _ => None,
                    };
                    info!(
                        user_id = event.record.user_id,
                        date = %event.record.date,
                        ?period_id,
                        status = ?event.record.status,
                        "Attendance changed"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Attendance event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(service.clone())
            .app_data(config_data.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
