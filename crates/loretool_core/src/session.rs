use anyhow::{Context, Result, bail};

use crate::dirty::Baseline;
use crate::document::World;
use crate::store::{ContentStore, load_document, save_document};
use crate::tree::{self, Direction, TreePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Clean,
    Dirty,
    Saving,
    SaveFailed,
}

/// What a successful save touched on disk.
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    pub created_assets: Vec<String>,
}

/// One open world document plus everything needed to edit it safely:
/// the live tree, the baseline it is compared against, and the single
/// inline-edit slot. All tree mutations route through here so that the
/// dirty state can never drift from the document.
pub struct EditingSession {
    world_id: String,
    document_path: String,
    world: World,
    baseline: Baseline,
    state: SessionState,
    editing_path: Option<TreePath>,
}

impl EditingSession {
    pub fn open<S: ContentStore + ?Sized>(
        store: &S,
        world_id: &str,
        document_path: &str,
    ) -> Result<Self> {
        let world: World = load_document(store, document_path)
            .with_context(|| format!("failed to open world {world_id}"))?;
        let baseline = Baseline::capture(&world)?;
        Ok(Self {
            world_id: world_id.to_string(),
            document_path: document_path.to_string(),
            world,
            baseline,
            state: SessionState::Clean,
            editing_path: None,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, SessionState::Dirty | SessionState::SaveFailed)
    }

    pub fn editing_path(&self) -> Option<&TreePath> {
        self.editing_path.as_ref()
    }

    /// Marks one node as under inline edit. The slot holds at most one
    /// path; opening an edit elsewhere closes the previous one.
    pub fn begin_edit(&mut self, path: TreePath) -> Result<()> {
        if tree::node(&self.world, &path).is_none() {
            bail!("no category at {path}");
        }
        self.editing_path = Some(path);
        Ok(())
    }

    pub fn end_edit(&mut self) {
        self.editing_path = None;
    }

    pub fn add_top_level(&mut self, name: &str) -> Result<TreePath> {
        self.ensure_editable()?;
        let path = tree::add_top_level(&mut self.world, &self.world_id, name)?;
        self.refresh_state()?;
        Ok(path)
    }

    pub fn add_child(&mut self, parent: &TreePath, name: &str) -> Result<TreePath> {
        self.ensure_editable()?;
        let path = tree::add_child(&mut self.world, &self.world_id, parent, name)?;
        self.refresh_state()?;
        Ok(path)
    }

    pub fn rename(&mut self, path: &TreePath, new_name: &str) -> Result<TreePath> {
        self.ensure_editable()?;
        let renamed = tree::rename(&mut self.world, path, new_name)?;
        if let Some(editing) = self.editing_path.take() {
            self.editing_path = if editing == *path {
                Some(renamed.clone())
            } else if path.is_ancestor_of(&editing) {
                // the edited node kept its own key; one ancestor
                // segment of its path changed
                let mut segments = editing.segments().to_vec();
                segments[path.level()] = renamed.last().to_string();
                TreePath::new(segments)
            } else {
                Some(editing)
            };
        }
        self.refresh_state()?;
        Ok(renamed)
    }

    pub fn update_leaf_fields(
        &mut self,
        path: &TreePath,
        description: &str,
        items_url: &str,
    ) -> Result<()> {
        self.ensure_editable()?;
        tree::update_leaf_fields(&mut self.world, path, description, items_url)?;
        self.refresh_state()?;
        Ok(())
    }

    pub fn remove(&mut self, path: &TreePath) -> Result<()> {
        self.ensure_editable()?;
        tree::remove(&mut self.world, path)?;
        if self
            .editing_path
            .as_ref()
            .is_some_and(|editing| editing == path || path.is_ancestor_of(editing))
        {
            self.editing_path = None;
        }
        self.refresh_state()?;
        Ok(())
    }

    pub fn move_node(&mut self, source: &TreePath, target: &TreePath) -> Result<()> {
        self.ensure_editable()?;
        tree::move_node(&mut self.world, source, target)?;
        self.refresh_state()?;
        Ok(())
    }

    pub fn reorder(&mut self, path: &TreePath, direction: Direction) -> Result<()> {
        self.ensure_editable()?;
        tree::reorder(&mut self.world, path, direction)?;
        self.refresh_state()?;
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.ensure_editable()?;
        if name.trim().is_empty() {
            bail!("world name cannot be empty");
        }
        self.world.name = name.to_string();
        self.refresh_state()?;
        Ok(())
    }

    pub fn set_theme(&mut self, theme: &str) -> Result<()> {
        self.ensure_editable()?;
        self.world.theme = theme.to_string();
        self.refresh_state()?;
        Ok(())
    }

    /// Discards every unsaved change, returning to the baseline.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_editable()?;
        self.world = self.baseline.restore()?;
        self.editing_path = None;
        self.state = SessionState::Clean;
        Ok(())
    }

    /// Persists the session. Item files for newly added leaves are
    /// created first, each leaf's new-flag cleared as its file lands;
    /// then the world document is written and the baseline rebased.
    ///
    /// A failure after some flags were cleared leaves them cleared: the
    /// item files those leaves describe do exist on disk, and the next
    /// successful save records the document as-is.
    pub fn save<S: ContentStore + ?Sized>(&mut self, store: &S) -> Result<SaveReport> {
        if self.state == SessionState::Saving {
            bail!("a save is already in progress");
        }
        self.state = SessionState::Saving;
        let mut report = SaveReport::default();

        for path in tree::collect_new_leaves(&self.world) {
            let items_url = tree::node(&self.world, &path)
                .and_then(|leaf| leaf.items_url.clone())
                .unwrap_or_default();
            if let Err(error) = store.ensure_asset_file(&items_url) {
                self.state = SessionState::SaveFailed;
                return Err(error)
                    .with_context(|| format!("failed to create item file for {path}"));
            }
            if let Some(leaf) = tree::node_mut(&mut self.world, &path) {
                leaf.is_new = false;
            }
            report.created_assets.push(items_url);
        }

        if let Err(error) = save_document(store, &self.document_path, &self.world) {
            self.state = SessionState::SaveFailed;
            return Err(error)
                .with_context(|| format!("failed to write world {}", self.world_id));
        }

        self.baseline = Baseline::capture(&self.world)?;
        self.state = SessionState::Clean;
        Ok(report)
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.state == SessionState::Saving {
            bail!("cannot edit while a save is in progress");
        }
        Ok(())
    }

    fn refresh_state(&mut self) -> Result<()> {
        self.state = if self.baseline.differs(&self.world)? {
            SessionState::Dirty
        } else {
            SessionState::Clean
        };
        Ok(())
    }
}
