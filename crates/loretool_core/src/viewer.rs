use anyhow::{Context, Result, bail};

use crate::document::{Category, CategoryMap, Item, World};
use crate::store::{ContentStore, load_document};
use crate::tree::{self, TreePath};

/// One row of the flattened category outline, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineRow {
    pub path: TreePath,
    pub level: usize,
    pub is_leaf: bool,
    pub description: Option<String>,
    pub items_url: Option<String>,
}

impl OutlineRow {
    pub fn name(&self) -> &str {
        self.path.last()
    }
}

/// Flattens the category tree depth-first, parents before children,
/// siblings in map order.
pub fn outline(world: &World) -> Vec<OutlineRow> {
    fn walk(map: &CategoryMap, base: &[String], out: &mut Vec<OutlineRow>) {
        for (key, node) in map {
            let mut segments = base.to_vec();
            segments.push(key.clone());
            let Some(path) = TreePath::new(segments.clone()) else {
                continue;
            };
            out.push(OutlineRow {
                level: path.level(),
                is_leaf: node.is_leaf(),
                description: node.description.clone(),
                items_url: node.items_url.clone(),
                path,
            });
            walk(&node.subcategories, &segments, out);
            walk(&node.subsubcategories, &segments, out);
        }
    }

    let mut out = Vec::new();
    walk(&world.categories, &[], &mut out);
    out
}

/// The leaf a viewer page shows for a category name. Branch hits are
/// rejected: only leaves carry an item list.
pub fn find_leaf<'a>(world: &'a World, name: &str) -> Result<(TreePath, &'a Category)> {
    let path =
        tree::find_by_name(world, name).with_context(|| format!("no category named {name:?}"))?;
    let node = tree::node(world, &path).with_context(|| format!("no category at {path}"))?;
    if !node.is_leaf() {
        bail!("category {name:?} holds subcategories, not items");
    }
    Ok((path, node))
}

/// Items of a leaf category, loaded from its item file.
pub fn load_items<S: ContentStore + ?Sized>(store: &S, leaf: &Category) -> Result<Vec<Item>> {
    let items_url = leaf
        .items_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .context("category has no item file")?;
    let items: Vec<Item> = load_document(store, items_url)
        .with_context(|| format!("failed to load items from {items_url}"))?;
    Ok(items)
}
