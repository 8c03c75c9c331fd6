//! `savings-monitor`: keeps a dashboard mounted against the live sheet and
//! logs what it would show every time the state changes.

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use savings_client::{
    logging, ClientConfig, HttpTransport, PeriodicRefresh, PeriodicRefreshConfig,
    ReconciliationController, ReconciliationPolicy, SavingsApi, Screen, ScreenState,
    SessionStore, Transport,
};
use shared::aggregate::today_deposit_total;
use shared::{LoginRequest, Scope, Session};
use tracing::{debug, info, warn};

const USERNAME_ENV: &str = "SAVINGS_USERNAME";
const PASSWORD_ENV: &str = "SAVINGS_PASSWORD";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = ClientConfig::load()?;
    if !config.is_api_configured() {
        bail!("SAVINGS_API_URL is not configured; set it to the deployed web app URL");
    }

    let api = SavingsApi::new(HttpTransport::new(&config)?);
    let store = SessionStore::new(&config.data_dir);
    let session = restore_or_login(&api, &store).await?;

    let controller = Arc::new(ReconciliationController::new(
        api,
        session,
        Screen::Dashboard,
        ReconciliationPolicy::from(&config),
    ));
    let refresh = PeriodicRefresh::start(&controller, PeriodicRefreshConfig::from(&config));
    let mut changes = controller.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                report(&controller.snapshot(), controller.session(), config.recent_limit);
            }
        }
    }

    refresh.stop();
    controller.shutdown();
    Ok(())
}

/// Reuse the stored session unless a different account is requested
async fn restore_or_login<T: Transport>(
    api: &SavingsApi<T>,
    store: &SessionStore,
) -> anyhow::Result<Session> {
    let username = env::var(USERNAME_ENV)
        .ok()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    if let Some(session) = store.load()? {
        match &username {
            Some(wanted) if *wanted != session.user.username => {
                info!(
                    "Stored session belongs to {}, switching to {}",
                    session.user.username, wanted
                );
                store.clear()?;
            }
            _ => {
                info!("Resuming session of {}", session.user.username);
                return Ok(session);
            }
        }
    }

    let username = username.with_context(|| {
        format!("No stored session; set {} and {}", USERNAME_ENV, PASSWORD_ENV)
    })?;
    let password = env::var(PASSWORD_ENV).with_context(|| format!("{} is not set", PASSWORD_ENV))?;

    let session = api
        .login(&LoginRequest::new(&username, &password))
        .await
        .context("Login failed")?;
    store.save(&session)?;
    Ok(session)
}

fn report(state: &ScreenState, session: &Session, recent_limit: usize) {
    if let Some(notice) = &state.notice {
        warn!("{}", notice);
        return;
    }

    match session.scope() {
        Some(Scope::All) => {
            if let Some(stats) = &state.stats {
                info!(
                    "Students: {} | Total savings: Rp{:.0} | Deposits today: Rp{:.0}",
                    stats.total_students, stats.total_savings, stats.today_deposits
                );
                let local_today = today_deposit_total(&state.transactions, Utc::now());
                if (local_today - stats.today_deposits).abs() > f64::EPSILON {
                    debug!(
                        "Server reports Rp{:.0} deposited today, transactions add up to Rp{:.0}",
                        stats.today_deposits, local_today
                    );
                }
            }
            info!("Waiting for approval: {}", state.pending_count());
        }
        Some(Scope::Student(id)) => {
            info!(
                "Balance: Rp{:.0} | Pending deposits: Rp{:.0}",
                state.own_balance.unwrap_or(0.0),
                state.pending_deposit_total(&id)
            );
        }
        None => {}
    }

    for tx in state.recent_transactions(recent_limit) {
        info!(
            "  {} {:<8} Rp{:>12.0} {:<10} {}",
            tx.date.format("%Y-%m-%d"),
            tx.transaction_type.as_str(),
            tx.amount,
            tx.student_id,
            tx.status
        );
    }
}
