use anyhow::{Context, Result, bail};

use crate::dirty::{Baseline, is_dirty};
use crate::document::{Manifest, RenameInfo, WorldEntry};
use crate::session::SessionState;
use crate::store::{ContentStore, load_document, save_document};
use crate::tree::Direction;

pub const MANIFEST_DOCUMENT: &str = crate::runtime::MANIFEST_FILENAME;

const FORBIDDEN_ID_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// The manifest editor: world rows are added, renamed, hidden, and
/// reordered in memory, folder deletions are queued, and everything is
/// applied in one save pass.
pub struct ManifestSession {
    manifest: Manifest,
    baseline: Baseline,
    state: SessionState,
    pending_deletions: Vec<String>,
}

impl ManifestSession {
    pub fn open<S: ContentStore + ?Sized>(store: &S) -> Result<Self> {
        let manifest: Manifest =
            load_document(store, MANIFEST_DOCUMENT).context("failed to open world manifest")?;
        let baseline = Baseline::capture(&manifest)?;
        Ok(Self {
            manifest,
            baseline,
            state: SessionState::Clean,
            pending_deletions: Vec::new(),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, SessionState::Dirty | SessionState::SaveFailed)
    }

    pub fn pending_deletions(&self) -> &[String] {
        &self.pending_deletions
    }

    /// Declares a new world. Files are not touched until save, when the
    /// world gets scaffolded; until then the row carries the flag.
    pub fn add_world(&mut self, name: &str) -> Result<String> {
        self.ensure_editable()?;
        let id = world_id_from_name(name)?;
        if self.manifest.entry(&id).is_some() {
            bail!("a world with id {id:?} already exists");
        }
        let path = format!("data/{id}/{id}.json");
        self.manifest.worlds.push(WorldEntry {
            id: id.clone(),
            path,
            needs_scaffolding: Some(true),
            rename_info: None,
        });
        self.refresh_state()?;
        Ok(id)
    }

    /// Drops a world row. With `delete_files` the folder is queued for
    /// archive-and-delete at save time; without it the files stay on
    /// disk, merely unlisted.
    pub fn remove_world(&mut self, world_id: &str, delete_files: bool) -> Result<()> {
        self.ensure_editable()?;
        let index = self
            .manifest
            .position(world_id)
            .ok_or_else(|| anyhow::anyhow!("no world with id {world_id:?}"))?;
        let entry = self.manifest.worlds.remove(index);
        // a never-scaffolded world has no files to delete
        if delete_files && entry.needs_scaffolding != Some(true) {
            self.pending_deletions.push(entry.path);
        }
        self.refresh_state()?;
        Ok(())
    }

    /// Gives a world a new id. The document path moves with it; the old
    /// and new locations are recorded so the save pass can relocate the
    /// files. Renaming twice before a save keeps the original `from`.
    pub fn rename_world(&mut self, world_id: &str, new_name: &str) -> Result<String> {
        self.ensure_editable()?;
        let new_id = world_id_from_name(new_name)?;
        if new_id != world_id && self.manifest.entry(&new_id).is_some() {
            bail!("a world with id {new_id:?} already exists");
        }
        let index = self
            .manifest
            .position(world_id)
            .ok_or_else(|| anyhow::anyhow!("no world with id {world_id:?}"))?;
        let entry = &mut self.manifest.worlds[index];
        if new_id == entry.id {
            return Ok(new_id);
        }

        let new_path = format!("data/{new_id}/{new_id}.json");
        let from = match entry.rename_info.take() {
            Some(earlier) => earlier.from,
            None => entry.path.clone(),
        };
        entry.rename_info = Some(RenameInfo {
            from,
            to: new_path.clone(),
        });
        entry.id = new_id.clone();
        entry.path = new_path;
        self.refresh_state()?;
        Ok(new_id)
    }

    /// Hides a world from the viewer or shows it again. Hidden rows are
    /// kept in saved manifests; visible is the unmarked state.
    pub fn set_hidden(&mut self, world_id: &str, hidden: bool) -> Result<()> {
        self.ensure_editable()?;
        let index = self
            .manifest
            .position(world_id)
            .ok_or_else(|| anyhow::anyhow!("no world with id {world_id:?}"))?;
        let entry = &mut self.manifest.worlds[index];
        if entry.needs_scaffolding == Some(true) {
            bail!("world {world_id:?} has not been saved yet");
        }
        entry.needs_scaffolding = if hidden { Some(false) } else { None };
        self.refresh_state()?;
        Ok(())
    }

    /// Swaps the row with its neighbor; a swap past either end is a
    /// no-op.
    pub fn reorder(&mut self, world_id: &str, direction: Direction) -> Result<()> {
        self.ensure_editable()?;
        let index = self
            .manifest
            .position(world_id)
            .ok_or_else(|| anyhow::anyhow!("no world with id {world_id:?}"))?;
        let swap_with = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < self.manifest.worlds.len() => index + 1,
            _ => return Ok(()),
        };
        self.manifest.worlds.swap(index, swap_with);
        self.refresh_state()?;
        Ok(())
    }

    /// Repositions the row at an arbitrary index, clamped to the list.
    pub fn move_to(&mut self, world_id: &str, position: usize) -> Result<()> {
        self.ensure_editable()?;
        let index = self
            .manifest
            .position(world_id)
            .ok_or_else(|| anyhow::anyhow!("no world with id {world_id:?}"))?;
        let entry = self.manifest.worlds.remove(index);
        let position = position.min(self.manifest.worlds.len());
        self.manifest.worlds.insert(position, entry);
        self.refresh_state()?;
        Ok(())
    }

    /// Applies every queued change: the cleaned manifest is written
    /// first, then new worlds are scaffolded, renamed worlds relocated,
    /// and queued folders archived and deleted.
    pub fn save<S: ContentStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.state == SessionState::Saving {
            bail!("a save is already in progress");
        }
        self.state = SessionState::Saving;
        match self.save_inner(store) {
            Ok(()) => {
                self.state = SessionState::Clean;
                Ok(())
            }
            Err(error) => {
                self.state = SessionState::SaveFailed;
                Err(error)
            }
        }
    }

    fn save_inner<S: ContentStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let to_scaffold: Vec<WorldEntry> = self
            .manifest
            .worlds
            .iter()
            .filter(|entry| entry.needs_scaffolding == Some(true))
            .cloned()
            .collect();
        let to_rename: Vec<WorldEntry> = self
            .manifest
            .worlds
            .iter()
            .filter(|entry| {
                entry.rename_info.is_some() && entry.needs_scaffolding != Some(false)
            })
            .cloned()
            .collect();

        let mut cleaned = self.manifest.clone();
        for entry in &mut cleaned.worlds {
            entry.rename_info = None;
            // only the hidden marker survives a save
            if entry.needs_scaffolding == Some(true) {
                entry.needs_scaffolding = None;
            }
        }

        save_document(store, MANIFEST_DOCUMENT, &cleaned)
            .context("failed to write world manifest")?;

        for entry in &to_scaffold {
            store
                .scaffold_world(&entry.id, &entry.path)
                .with_context(|| format!("failed to scaffold world {}", entry.id))?;
        }

        for entry in &to_rename {
            let info = match entry.rename_info.as_ref() {
                Some(info) => info,
                None => continue,
            };
            store
                .rename_world_path(&entry.id, &info.from, &info.to)
                .with_context(|| format!("failed to relocate world {}", entry.id))?;
        }

        // each path leaves the queue only once its delete succeeded, so
        // a failed save keeps the rest queued for retry
        while let Some(path) = self.pending_deletions.first().cloned() {
            store
                .delete_world_folder(&path)
                .with_context(|| format!("failed to delete world folder for {path}"))?;
            self.pending_deletions.remove(0);
        }

        let manifest: Manifest = load_document(store, MANIFEST_DOCUMENT)
            .context("failed to reload world manifest")?;
        self.baseline = Baseline::capture(&manifest)?;
        self.manifest = manifest;
        Ok(())
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.state == SessionState::Saving {
            bail!("cannot edit while a save is in progress");
        }
        Ok(())
    }

    fn refresh_state(&mut self) -> Result<()> {
        self.state = if is_dirty(&self.manifest, &self.baseline, self.pending_deletions.len())? {
            SessionState::Dirty
        } else {
            SessionState::Clean
        };
        Ok(())
    }
}

/// Derives a world id from a display name: forbidden filename characters
/// are stripped, whitespace collapses to underscores, letters lowercase.
pub fn world_id_from_name(name: &str) -> Result<String> {
    let cleaned: String = name
        .chars()
        .filter(|ch| !FORBIDDEN_ID_CHARS.contains(ch))
        .collect();
    let id = cleaned
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    if id.is_empty() {
        bail!("world name {name:?} leaves nothing usable for an id");
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{MANIFEST_DOCUMENT, ManifestSession, world_id_from_name};
    use crate::document::{Manifest, World};
    use crate::session::SessionState;
    use crate::store::{FsStore, load_document};
    use crate::tree::Direction;

    fn store_in(temp: &tempfile::TempDir) -> FsStore {
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");
        fs::write(root.join("manifest.json"), "{\"worlds\": []}").expect("write manifest");
        FsStore::new(root.clone(), root.join(".loretool").join("backups"))
    }

    #[test]
    fn ids_are_sanitized_and_lowercased() {
        assert_eq!(world_id_from_name("New World").expect("id"), "new_world");
        assert_eq!(world_id_from_name("a/b:c?").expect("id"), "abc");
        assert!(world_id_from_name("  ").is_err());
        assert!(world_id_from_name("</>").is_err());
    }

    #[test]
    fn added_world_is_flagged_until_saved() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");

        let id = session.add_world("Dune").expect("add");
        assert_eq!(id, "dune");
        assert!(session.is_dirty());
        let entry = session.manifest().entry("dune").expect("entry");
        assert_eq!(entry.needs_scaffolding, Some(true));
        assert_eq!(entry.path, "data/dune/dune.json");

        session.save(&store).expect("save");
        assert_eq!(session.state(), SessionState::Clean);

        // scaffolded on disk, flag gone from the saved manifest
        let world: World = load_document(&store, "data/dune/dune.json").expect("load world");
        assert_eq!(world.name, "Dune");
        let saved: Manifest = load_document(&store, MANIFEST_DOCUMENT).expect("load manifest");
        assert_eq!(saved.worlds[0].needs_scaffolding, None);
    }

    #[test]
    fn duplicate_world_ids_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        assert!(session.add_world("dune").is_err());
    }

    #[test]
    fn remove_with_delete_queues_the_folder() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        session.save(&store).expect("save");

        session.remove_world("dune", true).expect("remove");
        assert_eq!(session.pending_deletions(), ["data/dune/dune.json"]);
        assert!(session.is_dirty());

        session.save(&store).expect("save");
        assert!(session.pending_deletions().is_empty());
        assert!(!temp.path().join("project/data/dune").exists());
        // archived before removal
        let backups = temp.path().join("project/.loretool/backups");
        let archived = fs::read_dir(&backups)
            .expect("read backups")
            .flatten()
            .any(|entry| entry.file_name().to_string_lossy().ends_with(".zip"));
        assert!(archived);
    }

    #[test]
    fn failed_delete_keeps_remaining_deletions_queued() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Alpha").expect("add");
        session.add_world("Beta").expect("add");
        session.save(&store).expect("save");

        session.remove_world("alpha", true).expect("remove alpha");
        session.remove_world("beta", true).expect("remove beta");
        // the first queued folder is gone from disk, so its delete fails
        fs::remove_dir_all(temp.path().join("project/data/alpha")).expect("drop folder");

        assert!(session.save(&store).is_err());
        assert_eq!(session.state(), SessionState::SaveFailed);
        assert_eq!(session.pending_deletions().len(), 2);
        assert!(temp.path().join("project/data/beta").exists());

        fs::create_dir_all(temp.path().join("project/data/alpha")).expect("restore folder");
        fs::write(temp.path().join("project/data/alpha/alpha.json"), "{}").expect("restore file");
        session.save(&store).expect("retry save");
        assert!(session.pending_deletions().is_empty());
        assert_eq!(session.state(), SessionState::Clean);
        assert!(!temp.path().join("project/data/alpha").exists());
        assert!(!temp.path().join("project/data/beta").exists());
    }

    #[test]
    fn save_rebases_on_the_saved_document() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        session.save(&store).expect("save");

        let on_disk: Manifest = load_document(&store, MANIFEST_DOCUMENT).expect("load manifest");
        assert_eq!(session.manifest(), &on_disk);
        assert_eq!(session.state(), SessionState::Clean);
    }

    #[test]
    fn removing_an_unsaved_world_deletes_nothing() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        session.remove_world("dune", true).expect("remove");
        assert!(session.pending_deletions().is_empty());
        assert_eq!(session.state(), SessionState::Clean);
    }

    #[test]
    fn rename_relocates_files_on_save() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        session.save(&store).expect("save");

        let new_id = session.rename_world("dune", "Arrakis").expect("rename");
        assert_eq!(new_id, "arrakis");
        let entry = session.manifest().entry("arrakis").expect("entry");
        assert_eq!(entry.path, "data/arrakis/arrakis.json");
        assert!(entry.rename_info.is_some());

        session.save(&store).expect("save");
        assert!(temp.path().join("project/data/arrakis/arrakis.json").exists());
        assert!(!temp.path().join("project/data/dune").exists());

        let saved: Manifest = load_document(&store, MANIFEST_DOCUMENT).expect("load manifest");
        assert!(saved.worlds[0].rename_info.is_none());
    }

    #[test]
    fn double_rename_keeps_the_original_source_path() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        session.save(&store).expect("save");

        session.rename_world("dune", "Arrakis").expect("first rename");
        session.rename_world("arrakis", "Rakis").expect("second rename");
        let entry = session.manifest().entry("rakis").expect("entry");
        let info = entry.rename_info.as_ref().expect("rename info");
        assert_eq!(info.from, "data/dune/dune.json");
        assert_eq!(info.to, "data/rakis/rakis.json");

        session.save(&store).expect("save");
        assert!(temp.path().join("project/data/rakis/rakis.json").exists());
        assert!(!temp.path().join("project/data/dune").exists());
    }

    #[test]
    fn hidden_worlds_keep_their_marker_across_saves() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        session.save(&store).expect("save");

        session.set_hidden("dune", true).expect("hide");
        session.save(&store).expect("save");
        let saved: Manifest = load_document(&store, MANIFEST_DOCUMENT).expect("load manifest");
        assert_eq!(saved.worlds[0].needs_scaffolding, Some(false));

        session.set_hidden("dune", false).expect("show");
        session.save(&store).expect("save");
        let saved: Manifest = load_document(&store, MANIFEST_DOCUMENT).expect("load manifest");
        assert_eq!(saved.worlds[0].needs_scaffolding, None);
    }

    #[test]
    fn hiding_an_unsaved_world_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Dune").expect("add");
        assert!(session.set_hidden("dune", true).is_err());
    }

    #[test]
    fn reorder_swaps_rows_and_ignores_boundaries() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Alpha").expect("add");
        session.add_world("Beta").expect("add");

        session.reorder("beta", Direction::Up).expect("reorder");
        let ids: Vec<&str> = session
            .manifest()
            .worlds
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(ids, ["beta", "alpha"]);

        session.reorder("beta", Direction::Up).expect("reorder at top");
        let ids: Vec<&str> = session
            .manifest()
            .worlds
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(ids, ["beta", "alpha"]);
    }

    #[test]
    fn move_to_repositions_and_clamps() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let mut session = ManifestSession::open(&store).expect("open");
        session.add_world("Alpha").expect("add");
        session.add_world("Beta").expect("add");
        session.add_world("Gamma").expect("add");

        session.move_to("gamma", 0).expect("move to front");
        session.move_to("alpha", 99).expect("move past end");
        let ids: Vec<&str> = session
            .manifest()
            .worlds
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(ids, ["gamma", "beta", "alpha"]);
    }
}
