//! Pagination & navigation engine
//!
//! [`FolderBrowser`] owns the browsing state for one folder context: the
//! accumulated entry list, the continuation cursor, the breadcrumb path and
//! the per-entry permission map. Page loads are serialized by an in-flight
//! flag, navigation resets the context atomically, and an epoch counter
//! keeps late responses from an abandoned context out of the new one.
//!
//! The windowed render contract (`is_row_loaded` / `load_more_rows` /
//! `on_rows_rendered` / `row_count`) lives here too; a virtualization layer
//! only ever reads state and reports window bounds, never mutates.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::io::AsyncWrite;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::graph::{
    DriveError, Entry, ListingGateway, PageCursor, PathSegment, PermissionGrant, RowCount,
    VisibleWindow,
};
use crate::session::Session;

/// Navigation target: a child folder of the current listing, or an index
/// into the breadcrumb path.
#[derive(Debug)]
pub enum NavTarget<'a> {
    Child(&'a Entry),
    Breadcrumb(usize),
}

/// Browsing state for the current folder context. Owned exclusively by the
/// engine and the permission sweep; the render boundary reads snapshots.
pub(crate) struct BrowserState {
    pub(crate) entries: Vec<Entry>,
    /// Absent key = never fetched; present-and-empty = fetched, no grants
    pub(crate) permissions: HashMap<String, Vec<PermissionGrant>>,
    pub(crate) cursor: PageCursor,
    pub(crate) path: Vec<PathSegment>,
    pub(crate) folder_id: String,
    /// At most one listing request per folder context is outstanding
    pub(crate) page_loading: bool,
    /// Bumped on every navigation; responses carrying an older epoch are
    /// dropped before any mutation
    pub(crate) epoch: u64,
    pub(crate) window: Option<VisibleWindow>,
}

impl BrowserState {
    pub(crate) fn new() -> Self {
        let root = PathSegment::root();
        Self {
            entries: Vec::new(),
            permissions: HashMap::new(),
            cursor: PageCursor::Unset,
            folder_id: root.id.clone(),
            path: vec![root],
            page_loading: false,
            epoch: 0,
            window: None,
        }
    }
}

/// Shared core handed to the credential watcher and the permission sweep.
pub(crate) struct Core {
    pub(crate) state: RwLock<BrowserState>,
    pub(crate) gateway: Arc<dyn ListingGateway>,
    pub(crate) session: Session,
}

impl Core {
    /// Load the next listing page for the current folder context.
    ///
    /// No-op when a page fetch is already in flight, when the cursor is
    /// exhausted, or when no credential is installed; in all three cases
    /// zero network requests are issued. A failed fetch leaves the state
    /// unchanged apart from clearing the in-flight flag, so the next
    /// trigger retries.
    pub(crate) async fn load_next_page(&self) {
        if !self.session.has_token() {
            debug!("skipping page load: no session credential");
            return;
        }

        let (folder_id, cursor, epoch) = {
            let mut st = self.state.write().await;
            if st.page_loading || st.cursor.is_exhausted() {
                return;
            }
            st.page_loading = true;
            let cursor = match &st.cursor {
                PageCursor::Next(link) => Some(link.clone()),
                _ => None,
            };
            (st.folder_id.clone(), cursor, st.epoch)
        };

        let result = self.gateway.list_children(&folder_id, cursor.as_deref()).await;

        let committed = {
            let mut st = self.state.write().await;
            if st.epoch != epoch {
                // The context this response belongs to is gone. The
                // in-flight flag now belongs to the new context, so leave
                // it alone.
                debug!("dropping stale listing response for folder {folder_id}");
                None
            } else {
                st.page_loading = false;
                match result {
                    Ok(page) => {
                        st.entries.extend(page.entries.iter().cloned());
                        st.cursor = match page.next {
                            Some(link) => PageCursor::Next(link),
                            None => PageCursor::Exhausted,
                        };
                        info!(
                            "committed page of {} entries for folder {} ({} total)",
                            page.entries.len(),
                            folder_id,
                            st.entries.len()
                        );
                        Some(page.entries)
                    }
                    Err(e) => {
                        warn!("listing failed for folder {folder_id}: {e}");
                        None
                    }
                }
            }
        };

        // A page's permission batch is issued only after its entries are
        // committed to the accumulated list.
        if let Some(entries) = committed {
            self.enrich_entries(&entries, epoch).await;
        }
    }

    /// Trigger the initial page load when the current context has never
    /// been loaded. Used by the credential watcher so a token appearing
    /// starts exactly one load.
    pub(crate) async fn ensure_initial_load(&self) {
        let fresh = {
            let st = self.state.read().await;
            matches!(st.cursor, PageCursor::Unset) && !st.page_loading
        };
        if fresh {
            self.load_next_page().await;
        }
    }

    /// Fetch permissions for the given entries in parallel and merge the
    /// results. Each fetch is independently fault-tolerant: a failure
    /// records an empty grant list for that entry instead of aborting the
    /// batch. The merge only applies when `epoch` still matches.
    pub(crate) async fn enrich_entries(&self, entries: &[Entry], epoch: u64) {
        if entries.is_empty() {
            return;
        }

        let fetches = entries.iter().map(|entry| {
            let gateway = Arc::clone(&self.gateway);
            let id = entry.id.clone();
            async move {
                let grants = match gateway.item_permissions(&id).await {
                    Ok(grants) => grants,
                    Err(e) => {
                        warn!("permission fetch failed for {id}: {e}");
                        Vec::new()
                    }
                };
                (id, grants)
            }
        });
        let results = join_all(fetches).await;

        let mut st = self.state.write().await;
        if st.epoch != epoch {
            debug!("dropping stale permission batch ({} entries)", results.len());
            return;
        }
        for (id, grants) in results {
            st.permissions.insert(id, grants);
        }
    }
}

/// Watch the session for credential transitions and kick off the initial
/// page load when a token appears. Runs until the supplier side drops.
async fn credential_watcher(core: Arc<Core>, mut session: Session) {
    while session.changed().await {
        if session.has_token() {
            core.ensure_initial_load().await;
        }
    }
}

/// Incremental folder browser over a [`ListingGateway`].
pub struct FolderBrowser {
    core: Arc<Core>,
    watcher: JoinHandle<()>,
}

impl FolderBrowser {
    /// Create a browser rooted at the drive root. Construction performs no
    /// I/O; the first page loads when a credential is installed into the
    /// session, or on the first explicit [`Self::load_next_page`] /
    /// [`Self::load_more_rows`] call once a credential is present.
    pub fn new(gateway: Arc<dyn ListingGateway>, session: Session) -> Self {
        let core = Arc::new(Core {
            state: RwLock::new(BrowserState::new()),
            gateway,
            session: session.clone(),
        });
        let watcher = tokio::spawn(credential_watcher(Arc::clone(&core), session));
        Self { core, watcher }
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Load the next page of the current folder (see [`Core::load_next_page`]
    /// constraints: in-flight, exhausted-cursor and missing-credential calls
    /// are no-ops).
    pub async fn load_next_page(&self) {
        self.core.load_next_page().await;
    }

    /// Navigate into a child folder or to a breadcrumb index.
    ///
    /// Discards the accumulated entries and permission records of the
    /// abandoned context, resets the cursor, adjusts the path and triggers
    /// one initial page load for the target. Navigating into a non-folder
    /// entry, or to a breadcrumb index past the end of the path, is a no-op.
    pub async fn navigate(&self, target: NavTarget<'_>) {
        {
            let mut st = self.core.state.write().await;
            let folder_id = match target {
                NavTarget::Child(entry) => {
                    if !entry.is_folder {
                        debug!("ignoring navigation into non-folder entry {}", entry.id);
                        return;
                    }
                    st.path.push(PathSegment {
                        id: entry.id.clone(),
                        name: entry.name.clone(),
                    });
                    entry.id.clone()
                }
                NavTarget::Breadcrumb(index) => {
                    if index >= st.path.len() {
                        debug!("ignoring navigation to breadcrumb index {index} (out of range)");
                        return;
                    }
                    st.path.truncate(index + 1);
                    st.path[index].id.clone()
                }
            };

            st.epoch += 1;
            st.entries.clear();
            st.permissions.clear();
            st.cursor = PageCursor::Unset;
            st.window = None;
            // Any outstanding request belongs to the dead epoch.
            st.page_loading = false;
            st.folder_id = folder_id;
            info!(
                "navigated to folder {} (path depth {})",
                st.folder_id,
                st.path.len()
            );
        }
        self.core.load_next_page().await;
    }

    /// Stream a non-folder entry's content into `dest`.
    pub async fn download<W>(&self, entry: &Entry, dest: &mut W) -> Result<u64, DriveError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if entry.is_folder {
            return Err(DriveError::NotAFile(entry.name.clone()));
        }
        self.core.gateway.download(&entry.id, dest).await
    }

    // -----------------------------------------------------------------------
    // Windowed render contract
    // -----------------------------------------------------------------------

    /// Whether an entry exists at the given row index.
    pub async fn is_row_loaded(&self, index: usize) -> bool {
        index < self.core.state.read().await.entries.len()
    }

    /// Ask for more rows. Safe to call redundantly for overlapping ranges;
    /// the in-flight guard deduplicates.
    pub async fn load_more_rows(&self) {
        self.load_next_page().await;
    }

    /// Record the visible row window reported by the render layer. Purely
    /// informational; never performs I/O (the sweep consumes it).
    pub async fn on_rows_rendered(&self, start: usize, stop: usize) {
        self.core.state.write().await.window = Some(VisibleWindow { start, stop });
    }

    /// Row count for the virtualization layer: exact once the cursor is
    /// exhausted, otherwise a lower bound.
    pub async fn row_count(&self) -> RowCount {
        let st = self.core.state.read().await;
        if st.cursor.is_exhausted() {
            RowCount::Exact(st.entries.len())
        } else {
            RowCount::AtLeast(st.entries.len())
        }
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    /// Snapshot of the accumulated entries, in service order.
    pub async fn entries(&self) -> Vec<Entry> {
        self.core.state.read().await.entries.clone()
    }

    /// Breadcrumb path from root to the current folder.
    pub async fn path(&self) -> Vec<PathSegment> {
        self.core.state.read().await.path.clone()
    }

    pub async fn current_folder_id(&self) -> String {
        self.core.state.read().await.folder_id.clone()
    }

    /// Grants known for an entry. `None` = not fetched yet, `Some` with an
    /// empty vec = fetched and carrying no extra grants.
    pub async fn permissions_for(&self, entry_id: &str) -> Option<Vec<PermissionGrant>> {
        self.core.state.read().await.permissions.get(entry_id).cloned()
    }
}

impl Drop for FolderBrowser {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
