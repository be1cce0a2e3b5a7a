use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Pristine snapshot of a document, captured at load time and again after
/// every successful save. Stored as the serialized text, not a parsed
/// value: key order is significant for category maps, and a plain string
/// comparison is the only order-sensitive structural equality here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    snapshot: String,
}

impl Baseline {
    pub fn capture<T: Serialize>(document: &T) -> Result<Self> {
        let snapshot =
            serde_json::to_string(document).context("failed to snapshot document baseline")?;
        Ok(Self { snapshot })
    }

    /// Order-sensitive, key-for-key structural difference.
    pub fn differs<T: Serialize>(&self, current: &T) -> Result<bool> {
        let rendered =
            serde_json::to_string(current).context("failed to serialize document for comparison")?;
        Ok(rendered != self.snapshot)
    }

    /// Re-clones the pristine document, for reset.
    pub fn restore<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.snapshot).context("failed to restore document from baseline")
    }
}

/// A document is dirty when it structurally differs from its baseline or
/// when deletions are still pending (the world-list editor tracks folder
/// deletions outside the document itself).
pub fn is_dirty<T: Serialize>(
    current: &T,
    baseline: &Baseline,
    pending_deletions: usize,
) -> Result<bool> {
    Ok(pending_deletions > 0 || baseline.differs(current)?)
}

#[cfg(test)]
mod tests {
    use super::{Baseline, is_dirty};
    use crate::document::World;
    use crate::tree::{self, Direction, TreePath};

    fn world_with(names: &[&str]) -> World {
        let mut world = World {
            name: "Outpost".to_string(),
            theme: "theme-default".to_string(),
            categories: Default::default(),
        };
        for name in names {
            tree::add_top_level(&mut world, "w", name).expect("add");
        }
        world
    }

    #[test]
    fn untouched_document_is_clean() {
        let world = world_with(&["A", "B"]);
        let baseline = Baseline::capture(&world).expect("capture");
        assert!(!baseline.differs(&world).expect("compare"));
        assert!(!is_dirty(&world, &baseline, 0).expect("dirty"));
    }

    #[test]
    fn reordering_alone_is_detected() {
        // same keys, different order: an order-insensitive comparison
        // would miss this
        let mut world = world_with(&["A", "B"]);
        let baseline = Baseline::capture(&world).expect("capture");
        tree::reorder(&mut world, &TreePath::top("B"), Direction::Up).expect("reorder");
        assert!(baseline.differs(&world).expect("compare"));
    }

    #[test]
    fn pending_deletions_force_dirty() {
        let world = world_with(&["A"]);
        let baseline = Baseline::capture(&world).expect("capture");
        assert!(is_dirty(&world, &baseline, 1).expect("dirty"));
    }

    #[test]
    fn restore_returns_the_pristine_document() {
        let mut world = world_with(&["A", "B"]);
        let baseline = Baseline::capture(&world).expect("capture");
        tree::remove(&mut world, &TreePath::top("A")).expect("remove");

        let restored: World = baseline.restore().expect("restore");
        assert_eq!(restored, world_with(&["A", "B"]));
        assert!(!baseline.differs(&restored).expect("compare"));
    }
}
