//! Recurring permission sweep
//!
//! A page commit enriches its own entries once; this scheduler is the
//! second trigger. On a fixed interval it walks the rows inside the visible
//! window and fetches grants for any entry whose id is absent from the
//! permission map. A present key, even with empty grants, is never fetched
//! again. The task is aborted when the sweeper is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::browser::{Core, FolderBrowser};

/// Walk the visible window once and enrich entries with no permission
/// record. Skips entirely without a credential or a reported window.
pub(crate) async fn sweep_once(core: &Core) {
    if !core.session.has_token() {
        return;
    }

    let (targets, epoch) = {
        let st = core.state.read().await;
        let Some(window) = st.window else {
            return;
        };
        let mut targets = Vec::new();
        for index in window.start..=window.stop {
            let Some(entry) = st.entries.get(index) else {
                break;
            };
            if !st.permissions.contains_key(&entry.id) {
                targets.push(entry.clone());
            }
        }
        (targets, st.epoch)
    };

    if targets.is_empty() {
        return;
    }
    debug!("sweeping permissions for {} visible entries", targets.len());
    core.enrich_entries(&targets, epoch).await;
}

/// Background task re-checking the visible window on a fixed interval.
pub struct PermissionSweeper {
    task: JoinHandle<()>,
}

impl PermissionSweeper {
    /// Spawn the sweep loop against a browser. The loop runs until the
    /// sweeper is dropped; missed ticks are delayed rather than bursted.
    pub fn spawn(browser: &FolderBrowser, interval: Duration) -> Self {
        let core = Arc::clone(browser.core());
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweep_once(&core).await;
            }
        });
        Self { task }
    }
}

impl Drop for PermissionSweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::tests::{files, MockGateway};
    use crate::browser::BrowserState;
    use crate::graph::{ListingGateway, VisibleWindow, ROOT_FOLDER_ID};
    use crate::session::Session;
    use std::sync::atomic::Ordering;
    use tokio::sync::RwLock;

    fn core_with(mock: &Arc<MockGateway>, with_token: bool) -> Core {
        let session = if with_token {
            let (handle, session) = Session::with_token("token");
            std::mem::forget(handle);
            session
        } else {
            let (handle, session) = Session::new();
            std::mem::forget(handle);
            session
        };
        Core {
            state: RwLock::new(BrowserState::new()),
            gateway: Arc::clone(mock) as Arc<dyn ListingGateway>,
            session,
        }
    }

    async fn seed_entries(core: &Core, count: usize, window: Option<(usize, usize)>) {
        let mut st = core.state.write().await;
        st.entries = files("e", count);
        st.window = window.map(|(start, stop)| VisibleWindow { start, stop });
    }

    #[tokio::test]
    async fn test_sweep_fetches_only_absent_keys() {
        let mock = Arc::new(MockGateway::new());
        let core = core_with(&mock, true);
        seed_entries(&core, 10, Some((2, 4))).await;
        core.state
            .write()
            .await
            .permissions
            .insert("e3".to_string(), Vec::new());

        sweep_once(&core).await;

        // e3 was already recorded (even though empty), so only e2 and e4
        // are fetched.
        assert_eq!(mock.perm_calls.load(Ordering::SeqCst), 2);
        let st = core.state.read().await;
        assert!(st.permissions.contains_key("e2"));
        assert!(st.permissions.contains_key("e4"));
        assert_eq!(st.permissions["e3"], Vec::new());
        assert!(!st.permissions.contains_key("e5"));
    }

    #[tokio::test]
    async fn test_fully_enriched_window_issues_no_fetches() {
        let mock = Arc::new(MockGateway::new());
        let core = core_with(&mock, true);
        seed_entries(&core, 20, Some((10, 15))).await;
        {
            let mut st = core.state.write().await;
            for i in 10..=15 {
                st.permissions.insert(format!("e{i}"), Vec::new());
            }
        }

        sweep_once(&core).await;
        assert_eq!(mock.perm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_without_window_or_token() {
        let mock = Arc::new(MockGateway::new());

        let core = core_with(&mock, true);
        seed_entries(&core, 5, None).await;
        sweep_once(&core).await;
        assert_eq!(mock.perm_calls.load(Ordering::SeqCst), 0);

        let no_token = core_with(&mock, false);
        seed_entries(&no_token, 5, Some((0, 4))).await;
        sweep_once(&no_token).await;
        assert_eq!(mock.perm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_window_clamped_to_loaded_rows() {
        let mock = Arc::new(MockGateway::new());
        let core = core_with(&mock, true);
        seed_entries(&core, 3, Some((0, 50))).await;

        sweep_once(&core).await;
        assert_eq!(mock.perm_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_and_stops_on_drop() {
        let mock = Arc::new(MockGateway::new());
        mock.script_page(ROOT_FOLDER_ID, None, files("e", 4), None);
        let (handle, session) = Session::with_token("token");
        std::mem::forget(handle);
        let browser = FolderBrowser::new(Arc::clone(&mock) as Arc<dyn ListingGateway>, session);
        browser.load_next_page().await;
        browser.on_rows_rendered(0, 3).await;

        let sweeper = PermissionSweeper::spawn(&browser, Duration::from_millis(10));

        // Forget one entry so the next tick has work to do.
        browser
            .core()
            .state
            .write()
            .await
            .permissions
            .remove("e1");
        let before = mock.perm_calls.load(Ordering::SeqCst);
        for _ in 0..500 {
            if mock.perm_calls.load(Ordering::SeqCst) > before {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(mock.perm_calls.load(Ordering::SeqCst) > before);
        assert!(browser.permissions_for("e1").await.is_some());

        drop(sweeper);
        tokio::time::sleep(Duration::from_millis(30)).await;
        browser
            .core()
            .state
            .write()
            .await
            .permissions
            .remove("e2");
        let after_drop = mock.perm_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.perm_calls.load(Ordering::SeqCst), after_drop);
    }
}
