use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Category maps are insertion-ordered: key order is display order, and it
/// must survive a serialize/deserialize round trip byte-for-byte.
pub type CategoryMap = IndexMap<String, Category>;

/// One world document (`data/<folder>/<file>.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct World {
    pub name: String,
    pub theme: String,
    #[serde(default)]
    pub categories: CategoryMap,
}

/// A node in a world's category tree. A leaf carries `description` and
/// `items_url`; a branch carries a non-empty child map. A node never
/// carries both at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Category {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_url: Option<String>,
    #[serde(rename = "isNew", default, skip_serializing_if = "is_false")]
    pub is_new: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub subcategories: CategoryMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub subsubcategories: CategoryMap,
}

impl Category {
    /// A freshly added leaf; `is_new` marks it for asset creation on save.
    pub fn new_leaf(items_url: impl Into<String>) -> Self {
        Self {
            description: Some(String::new()),
            items_url: Some(items_url.into()),
            is_new: true,
            ..Self::default()
        }
    }

    pub fn has_children(&self) -> bool {
        !self.subcategories.is_empty() || !self.subsubcategories.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children()
    }

    /// Becoming a branch drops the leaf fields.
    pub fn clear_leaf_fields(&mut self) {
        self.description = None;
        self.items_url = None;
        self.is_new = false;
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The world-list document (`manifest.json`). Array order is significant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub worlds: Vec<WorldEntry>,
}

impl Manifest {
    pub fn entry(&self, world_id: &str) -> Option<&WorldEntry> {
        self.worlds.iter().find(|entry| entry.id == world_id)
    }

    pub fn position(&self, world_id: &str) -> Option<usize> {
        self.worlds.iter().position(|entry| entry.id == world_id)
    }
}

/// One manifest row. `needs_scaffolding` is `Some(true)` for a world whose
/// files have not been created yet and `Some(false)` for a world hidden
/// from the viewer; saved manifests only keep the `false` form.
/// `rename_info` is transient: recorded when an edit changes the path,
/// consumed by the manifest save protocol, never written back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldEntry {
    pub id: String,
    pub path: String,
    #[serde(
        rename = "needsScaffolding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub needs_scaffolding: Option<bool>,
    #[serde(rename = "renameInfo", default, skip_serializing_if = "Option::is_none")]
    pub rename_info: Option<RenameInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenameInfo {
    pub from: String,
    pub to: String,
}

/// One entry of a leaf category's item-list document. `sidebar` and
/// `galleries` are opaque to the core; the viewer passes them through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub full_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidebar: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub galleries: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::{Category, Manifest, World};

    #[test]
    fn world_round_trip_preserves_category_order() {
        let raw = r#"{
            "name": "Outpost",
            "theme": "theme-default",
            "categories": {
                "Zulu": { "description": "z", "items_url": "data/w/Zulu/Zulu.json" },
                "Alpha": {
                    "subcategories": {
                        "Beta": { "description": "", "items_url": "data/w/Alpha/Beta/Beta.json" }
                    }
                },
                "Mike": { "description": "m", "items_url": "data/w/Mike/Mike.json" }
            }
        }"#;
        let world: World = serde_json::from_str(raw).expect("parse world");
        let keys: Vec<&str> = world.categories.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Zulu", "Alpha", "Mike"]);

        let rendered = serde_json::to_string(&world).expect("serialize world");
        let reparsed: World = serde_json::from_str(&rendered).expect("reparse world");
        assert_eq!(reparsed, world);
        let keys: Vec<&str> = reparsed.categories.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Zulu", "Alpha", "Mike"]);
    }

    #[test]
    fn new_leaf_is_marked_and_classified_as_leaf() {
        let leaf = Category::new_leaf("data/w/A/A.json");
        assert!(leaf.is_leaf());
        assert!(leaf.is_new);
        assert_eq!(leaf.description.as_deref(), Some(""));
    }

    #[test]
    fn is_new_is_omitted_when_false() {
        let mut leaf = Category::new_leaf("data/w/A/A.json");
        leaf.is_new = false;
        let rendered = serde_json::to_string(&leaf).expect("serialize");
        assert!(!rendered.contains("isNew"));

        leaf.is_new = true;
        let rendered = serde_json::to_string(&leaf).expect("serialize");
        assert!(rendered.contains("\"isNew\":true"));
    }

    #[test]
    fn clear_leaf_fields_drops_all_leaf_state() {
        let mut node = Category::new_leaf("data/w/A/A.json");
        node.clear_leaf_fields();
        assert!(node.description.is_none());
        assert!(node.items_url.is_none());
        assert!(!node.is_new);
    }

    #[test]
    fn manifest_parses_transient_fields() {
        let raw = r#"{
            "worlds": [
                { "id": "scp", "path": "data/scp/world.json" },
                { "id": "dune", "path": "data/dune/world.json", "needsScaffolding": true },
                {
                    "id": "hp",
                    "path": "data/hp/world.json",
                    "renameInfo": { "from": "data/hp/world.json", "to": "data/potter/world.json" }
                }
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).expect("parse manifest");
        assert_eq!(manifest.worlds.len(), 3);
        assert_eq!(manifest.worlds[1].needs_scaffolding, Some(true));
        let rename = manifest.worlds[2].rename_info.as_ref().expect("rename info");
        assert_eq!(rename.to, "data/potter/world.json");
        assert_eq!(manifest.position("dune"), Some(1));
        assert!(manifest.entry("missing").is_none());
    }
}
