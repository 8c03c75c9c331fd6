//! Passive refresh of a mounted screen.
//!
//! [`PeriodicRefresh::start`] loads immediately and then every
//! `interval_ms`. A tick that finds a load of the same controller still in
//! flight is skipped. The timer stops when the handle is stopped or dropped,
//! or when the controller itself goes away.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::domain::reconciliation::ReconciliationController;
use crate::io::Transport;

/// Configuration for periodic refresh behavior
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicRefreshConfig {
    pub interval_ms: u64,
    /// Stagger the first load when several screens start together
    pub initial_delay_ms: Option<u64>,
}

impl Default for PeriodicRefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            initial_delay_ms: None,
        }
    }
}

impl From<&ClientConfig> for PeriodicRefreshConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval_ms: config.poll_interval_ms,
            initial_delay_ms: None,
        }
    }
}

/// Counters a view can show next to the refresh indicator
#[derive(Debug, Default)]
pub struct RefreshStatus {
    running: AtomicBool,
    refreshes: AtomicU64,
    skipped: AtomicU64,
    error_count: AtomicU32,
}

impl RefreshStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Loads started by the timer
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Ticks dropped because a load was already in flight
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Consecutive failed refreshes; reset by a good one
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }
}

pub struct PeriodicRefresh {
    handle: JoinHandle<()>,
    status: Arc<RefreshStatus>,
}

impl PeriodicRefresh {
    pub fn start<T: Transport + 'static>(
        controller: &Arc<ReconciliationController<T>>,
        config: PeriodicRefreshConfig,
    ) -> Self {
        let controller = Arc::downgrade(controller);
        let status = Arc::new(RefreshStatus::default());
        let task_status = Arc::clone(&status);
        let period = Duration::from_millis(config.interval_ms.max(1));

        let handle = tokio::spawn(async move {
            if let Some(delay) = config.initial_delay_ms {
                sleep(Duration::from_millis(delay)).await;
            }
            task_status.running.store(true, Ordering::SeqCst);
            info!("Periodic refresh active every {:?}", period);

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    debug!("Controller gone, stopping periodic refresh");
                    break;
                };

                if controller.is_loading() {
                    debug!("Skipping refresh tick for {} screen, load in flight", controller.screen());
                    task_status.skipped.fetch_add(1, Ordering::SeqCst);
                    continue;
                }

                task_status.refreshes.fetch_add(1, Ordering::SeqCst);
                match controller.load().await {
                    Ok(()) => task_status.error_count.store(0, Ordering::SeqCst),
                    Err(e) => {
                        let errors = task_status.error_count.fetch_add(1, Ordering::SeqCst) + 1;
                        warn!("Periodic refresh failed ({} in a row): {}", errors, e);
                    }
                }
            }
            task_status.running.store(false, Ordering::SeqCst);
        });

        Self { handle, status }
    }

    pub fn status(&self) -> &RefreshStatus {
        &self.status
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PeriodicRefresh {
    fn drop(&mut self) {
        self.handle.abort();
        self.status.running.store(false, Ordering::SeqCst);
        debug!("Periodic refresh stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reconciliation::ReconciliationPolicy;
    use crate::domain::screen::Screen;
    use crate::io::fake_sheet::FakeSheet;
    use crate::io::SavingsApi;
    use shared::{Role, Session, User};

    fn mount(sheet: &Arc<FakeSheet>) -> Arc<ReconciliationController<FakeSheet>> {
        let session = Session {
            user: User {
                id: "U1".to_string(),
                username: "admin".to_string(),
                name: "Admin".to_string(),
                role: Role::Admin,
                student_id: None,
            },
            token: "t".to_string(),
        };
        Arc::new(ReconciliationController::new(
            SavingsApi::from_arc(Arc::clone(sheet)),
            session,
            Screen::Students,
            ReconciliationPolicy::default(),
        ))
    }

    fn every(seconds: u64) -> PeriodicRefreshConfig {
        PeriodicRefreshConfig {
            interval_ms: seconds * 1000,
            initial_delay_ms: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_handle_is_dropped() {
        let sheet = Arc::new(FakeSheet::seeded());
        let controller = mount(&sheet);

        let refresh = PeriodicRefresh::start(&controller, every(30));
        sleep(Duration::from_secs(65)).await;
        assert_eq!(sheet.calls("getStudents"), 3);
        assert!(refresh.status().is_running());
        assert_eq!(refresh.status().refreshes(), 3);
        assert_eq!(controller.snapshot().students.len(), 2);

        drop(refresh);
        sleep(Duration::from_secs(120)).await;
        assert_eq!(sheet.calls("getStudents"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_ticks_while_a_load_is_in_flight() {
        let sheet = Arc::new(FakeSheet::seeded());
        sheet.delay("getStudents", Duration::from_secs(40));
        let controller = mount(&sheet);

        let manual = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.load().await }
        });
        while !controller.is_loading() {
            tokio::task::yield_now().await;
        }

        let refresh = PeriodicRefresh::start(
            &controller,
            PeriodicRefreshConfig {
                interval_ms: 30_000,
                initial_delay_ms: Some(5_000),
            },
        );

        sleep(Duration::from_secs(50)).await;
        assert_eq!(sheet.calls("getStudents"), 1);
        assert_eq!(refresh.status().skipped(), 2);
        assert!(manual.await.unwrap().is_ok());

        sleep(Duration::from_secs(20)).await;
        assert_eq!(sheet.calls("getStudents"), 2);
        assert_eq!(refresh.status().refreshes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_controller_is_gone() {
        let sheet = Arc::new(FakeSheet::seeded());
        let controller = mount(&sheet);
        let refresh = PeriodicRefresh::start(&controller, every(10));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sheet.calls("getStudents"), 1);

        drop(controller);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(sheet.calls("getStudents"), 1);
        assert!(!refresh.status().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_count_resets_after_success() {
        let sheet = Arc::new(FakeSheet::seeded());
        sheet.script(
            "getStudents",
            crate::io::fake_sheet::Scripted::fail(crate::ClientError::Transport("down".to_string())),
        );
        let controller = mount(&sheet);
        let refresh = PeriodicRefresh::start(&controller, every(10));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(refresh.status().error_count(), 1);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(refresh.status().error_count(), 0);
    }
}
