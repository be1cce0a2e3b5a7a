use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::document::{Category, World};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {path}")]
    NotFound { path: String },
    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Persistence boundary for all content documents. Paths are
/// forward-slash relative to the project root (`manifest.json`,
/// `data/<world>/world.json`, item files).
pub trait ContentStore {
    /// Raw document text. Callers deserialize it themselves so that
    /// category-map key order survives the trip.
    fn read_document(&self, path: &str) -> StoreResult<String>;
    /// Overwrites a document with already-serialized text.
    fn write_document(&self, path: &str, content: &str) -> StoreResult<()>;
    /// Creates the parent directory and an empty item-list file when
    /// absent; a no-op when the file already exists.
    fn ensure_asset_file(&self, path: &str) -> StoreResult<()>;
    /// Moves a world document (directory first, then the file inside).
    /// When the old path does not exist the world is scaffolded at the
    /// new path instead.
    fn rename_world_path(&self, world_id: &str, old_path: &str, new_path: &str)
    -> StoreResult<()>;
    /// Archives the folder holding the given world document into the
    /// backups directory, then deletes it.
    fn delete_world_folder(&self, path: &str) -> StoreResult<()>;
    /// Creates the default files for a newly declared world: folder,
    /// world document with one starter category, empty item list.
    fn scaffold_world(&self, world_id: &str, world_path: &str) -> StoreResult<()>;
}

pub fn load_document<S: ContentStore + ?Sized, T: DeserializeOwned>(
    store: &S,
    path: &str,
) -> StoreResult<T> {
    let content = store.read_document(path)?;
    serde_json::from_str(&content).map_err(|err| StoreError::Read {
        path: path.to_string(),
        source: anyhow::Error::new(err),
    })
}

pub fn save_document<S: ContentStore + ?Sized, T: Serialize>(
    store: &S,
    path: &str,
    document: &T,
) -> StoreResult<()> {
    let content = to_pretty_json(document).map_err(|err| StoreError::Write {
        path: path.to_string(),
        source: err,
    })?;
    store.write_document(path, &content)
}

/// 4-space pretty printing, matching the documents this tool inherits.
pub fn to_pretty_json<T: Serialize>(document: &T) -> Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    document
        .serialize(&mut serializer)
        .context("failed to serialize document")?;
    String::from_utf8(buffer).context("serialized document is not valid UTF-8")
}

/// Filesystem-backed store. Every write of an existing document leaves a
/// timestamped copy in the backups directory first; deleted world folders
/// are zip-archived before removal.
#[derive(Debug, Clone)]
pub struct FsStore {
    project_root: PathBuf,
    backups_dir: PathBuf,
}

impl FsStore {
    pub fn new(project_root: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            backups_dir: backups_dir.into(),
        }
    }

    /// Joins a relative document path under the project root, rejecting
    /// absolute paths and any `..` traversal out of it.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        if relative.is_empty() {
            return Err(anyhow!("document path cannot be empty"));
        }
        let mut out = self.project_root.clone();
        for segment in relative.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." || segment.contains('\\') || Path::new(segment).is_absolute() {
                return Err(anyhow!("document path escapes the project root: {relative}"));
            }
            out.push(segment);
        }
        Ok(out)
    }

    fn backup_existing(&self, absolute: &Path) -> Result<Option<PathBuf>> {
        if !absolute.exists() {
            return Ok(None);
        }
        let file_name = absolute
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("document has no file name: {}", absolute.display()))?;
        fs::create_dir_all(&self.backups_dir).with_context(|| {
            format!("failed to create backups dir {}", self.backups_dir.display())
        })?;
        let backup_path = self
            .backups_dir
            .join(format!("{file_name}.{}.bak", unix_timestamp()?));
        fs::copy(absolute, &backup_path)
            .with_context(|| format!("failed to back up {}", absolute.display()))?;
        Ok(Some(backup_path))
    }

    fn archive_folder(&self, folder: &Path) -> Result<PathBuf> {
        let dir_name = folder
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("world folder has no name: {}", folder.display()))?;
        fs::create_dir_all(&self.backups_dir).with_context(|| {
            format!("failed to create backups dir {}", self.backups_dir.display())
        })?;
        let zip_path = self
            .backups_dir
            .join(format!("{dir_name}-{}.zip", unix_timestamp()?));

        let file = fs::File::create(&zip_path)
            .with_context(|| format!("failed to create archive {}", zip_path.display()))?;
        let mut writer = ZipWriter::new(file);
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for entry in WalkDir::new(folder).follow_links(false) {
            let entry =
                entry.with_context(|| format!("failed to walk {}", folder.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(folder)
                .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            writer
                .start_file(name, options)
                .with_context(|| format!("failed to add {} to archive", relative.display()))?;
            let mut source = fs::File::open(entry.path())
                .with_context(|| format!("failed to open {}", entry.path().display()))?;
            io::copy(&mut source, &mut writer)
                .with_context(|| format!("failed to archive {}", entry.path().display()))?;
        }
        writer.finish().context("failed to finalize archive")?;
        Ok(zip_path)
    }
}

impl ContentStore for FsStore {
    fn read_document(&self, path: &str) -> StoreResult<String> {
        let absolute = self.resolve(path).map_err(|err| StoreError::Read {
            path: path.to_string(),
            source: err,
        })?;
        if !absolute.exists() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        fs::read_to_string(&absolute).map_err(|err| StoreError::Read {
            path: path.to_string(),
            source: anyhow::Error::new(err),
        })
    }

    fn write_document(&self, path: &str, content: &str) -> StoreResult<()> {
        let write_error = |source: anyhow::Error| StoreError::Write {
            path: path.to_string(),
            source,
        };
        let absolute = self.resolve(path).map_err(write_error)?;
        self.backup_existing(&absolute).map_err(write_error)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))
                .map_err(write_error)?;
        }
        fs::write(&absolute, content)
            .with_context(|| format!("failed to write {}", absolute.display()))
            .map_err(write_error)
    }

    fn ensure_asset_file(&self, path: &str) -> StoreResult<()> {
        let write_error = |source: anyhow::Error| StoreError::Write {
            path: path.to_string(),
            source,
        };
        let absolute = self.resolve(path).map_err(write_error)?;
        if let Some(parent) = absolute.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))
                .map_err(write_error)?;
        }
        if !absolute.exists() {
            fs::write(&absolute, "[]")
                .with_context(|| format!("failed to write {}", absolute.display()))
                .map_err(write_error)?;
        }
        Ok(())
    }

    fn rename_world_path(
        &self,
        world_id: &str,
        old_path: &str,
        new_path: &str,
    ) -> StoreResult<()> {
        let write_error = |source: anyhow::Error| StoreError::Write {
            path: new_path.to_string(),
            source,
        };
        let absolute_old = self.resolve(old_path).map_err(write_error)?;
        let absolute_new = self.resolve(new_path).map_err(write_error)?;
        let old_dir = absolute_old
            .parent()
            .ok_or_else(|| write_error(anyhow!("old path has no parent: {old_path}")))?
            .to_path_buf();
        let new_dir = absolute_new
            .parent()
            .ok_or_else(|| write_error(anyhow!("new path has no parent: {new_path}")))?
            .to_path_buf();

        if !old_dir.exists() {
            // nothing to move; set the world up fresh at its new home
            return self.scaffold_world(world_id, new_path);
        }

        if old_dir != new_dir {
            fs::rename(&old_dir, &new_dir)
                .with_context(|| {
                    format!(
                        "failed to rename {} to {}",
                        old_dir.display(),
                        new_dir.display()
                    )
                })
                .map_err(write_error)?;
        }

        let old_file = absolute_old.file_name();
        let new_file = absolute_new.file_name();
        if let (Some(old_file), Some(new_file)) = (old_file, new_file)
            && old_file != new_file
        {
            let interim = new_dir.join(old_file);
            fs::rename(&interim, &absolute_new)
                .with_context(|| {
                    format!(
                        "failed to rename {} to {}",
                        interim.display(),
                        absolute_new.display()
                    )
                })
                .map_err(write_error)?;
        }
        Ok(())
    }

    fn delete_world_folder(&self, path: &str) -> StoreResult<()> {
        let write_error = |source: anyhow::Error| StoreError::Write {
            path: path.to_string(),
            source,
        };
        let absolute = self.resolve(path).map_err(write_error)?;
        let folder = absolute
            .parent()
            .ok_or_else(|| write_error(anyhow!("world path has no parent: {path}")))?
            .to_path_buf();
        if !folder.exists() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        self.archive_folder(&folder).map_err(write_error)?;
        fs::remove_dir_all(&folder)
            .with_context(|| format!("failed to delete {}", folder.display()))
            .map_err(write_error)
    }

    fn scaffold_world(&self, world_id: &str, world_path: &str) -> StoreResult<()> {
        let write_error = |source: anyhow::Error| StoreError::Write {
            path: world_path.to_string(),
            source,
        };
        let absolute = self.resolve(world_path).map_err(write_error)?;
        let folder = absolute
            .parent()
            .ok_or_else(|| write_error(anyhow!("world path has no parent: {world_path}")))?
            .to_path_buf();
        fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create {}", folder.display()))
            .map_err(write_error)?;

        let items_name = format!("{world_id}_items.json");
        let items_relative = match world_path.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/{items_name}"),
            None => items_name.clone(),
        };

        if !absolute.exists() {
            let mut world = World {
                name: capitalize(world_id),
                theme: "theme-default".to_string(),
                categories: Default::default(),
            };
            let mut starter = Category::new_leaf(items_relative.clone());
            starter.is_new = false;
            world.categories.insert("General".to_string(), starter);
            let content = to_pretty_json(&world).map_err(write_error)?;
            fs::write(&absolute, content)
                .with_context(|| format!("failed to write {}", absolute.display()))
                .map_err(write_error)?;
        }

        self.ensure_asset_file(&items_relative)
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")
        .map(|duration| duration.as_secs())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{ContentStore, FsStore, StoreError, load_document, save_document};
    use crate::document::World;

    fn store_in(temp: &tempfile::TempDir) -> FsStore {
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");
        let backups = root.join(".loretool").join("backups");
        FsStore::new(root, backups)
    }

    #[test]
    fn read_missing_document_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let error = store.read_document("data/w/world.json").expect_err("must fail");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[test]
    fn write_then_read_round_trips_typed_documents() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let world = World {
            name: "Outpost".to_string(),
            theme: "theme-default".to_string(),
            categories: Default::default(),
        };

        save_document(&store, "data/w/world.json", &world).expect("save");
        let loaded: World = load_document(&store, "data/w/world.json").expect("load");
        assert_eq!(loaded, world);
    }

    #[test]
    fn overwriting_a_document_leaves_a_backup_copy() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store.write_document("data/w/world.json", "{\"v\":1}").expect("first write");
        store.write_document("data/w/world.json", "{\"v\":2}").expect("second write");

        let backups_dir = temp.path().join("project").join(".loretool").join("backups");
        let backups: Vec<_> = fs::read_dir(&backups_dir)
            .expect("read backups")
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("world.json."));
        assert!(backups[0].ends_with(".bak"));
    }

    #[test]
    fn ensure_asset_file_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store.ensure_asset_file("data/w/A/A.json").expect("first ensure");

        let asset = temp.path().join("project/data/w/A/A.json");
        fs::write(&asset, "[{\"name\":\"kept\"}]").expect("write items");
        store.ensure_asset_file("data/w/A/A.json").expect("second ensure");
        let content = fs::read_to_string(&asset).expect("read items");
        assert!(content.contains("kept"));
    }

    #[test]
    fn scaffold_world_creates_default_documents() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store.scaffold_world("dune", "data/dune/world.json").expect("scaffold");

        let world: World = load_document(&store, "data/dune/world.json").expect("load world");
        assert_eq!(world.name, "Dune");
        assert_eq!(world.theme, "theme-default");
        let starter = world.categories.get("General").expect("starter category");
        assert_eq!(starter.items_url.as_deref(), Some("data/dune/dune_items.json"));
        assert!(!starter.is_new);

        let items = store.read_document("data/dune/dune_items.json").expect("read items");
        assert_eq!(items, "[]");
    }

    #[test]
    fn scaffold_world_keeps_existing_world_document() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store.write_document(
            "data/dune/world.json",
            "{\"name\":\"Custom\",\"theme\":\"theme-default\",\"categories\":{}}",
        )
        .expect("write");

        store.scaffold_world("dune", "data/dune/world.json").expect("scaffold");
        let world: World = load_document(&store, "data/dune/world.json").expect("load");
        assert_eq!(world.name, "Custom");
    }

    #[test]
    fn rename_moves_directory_and_file() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store.write_document("data/old/world.json", "{}").expect("write");
        store.write_document("data/old/old_items.json", "[]").expect("write items");

        store
            .rename_world_path("w", "data/old/world.json", "data/new/universe.json")
            .expect("rename");

        assert!(temp.path().join("project/data/new/universe.json").exists());
        assert!(temp.path().join("project/data/new/old_items.json").exists());
        assert!(!temp.path().join("project/data/old").exists());
    }

    #[test]
    fn rename_of_missing_path_scaffolds_at_new_location() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store
            .rename_world_path("dune", "data/missing/world.json", "data/dune/world.json")
            .expect("rename");

        let world: World = load_document(&store, "data/dune/world.json").expect("load");
        assert_eq!(world.name, "Dune");
    }

    #[test]
    fn delete_world_folder_archives_before_removal() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        store.write_document("data/w/world.json", "{}").expect("write");
        store.write_document("data/w/w_items.json", "[]").expect("write items");

        store.delete_world_folder("data/w/world.json").expect("delete");
        assert!(!temp.path().join("project/data/w").exists());

        let backups_dir = temp.path().join("project").join(".loretool").join("backups");
        let archives: Vec<_> = fs::read_dir(&backups_dir)
            .expect("read backups")
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".zip"))
            .collect();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].starts_with("w-"));
    }

    #[test]
    fn delete_of_missing_folder_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let error = store
            .delete_world_folder("data/ghost/world.json")
            .expect_err("must fail");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[test]
    fn traversal_out_of_the_project_root_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = store_in(&temp);
        let error = store
            .write_document("../outside.json", "{}")
            .expect_err("must fail");
        assert!(error.to_string().contains("failed to write"));
        assert!(!temp.path().join("outside.json").exists());
    }
}
