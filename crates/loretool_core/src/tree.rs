use std::fmt;

use thiserror::Error;

use crate::document::{Category, CategoryMap, World};

/// Deepest allowed level: 0 = category, 1 = subcategory, 2 = subsubcategory.
pub const MAX_LEVEL: usize = 2;

pub type TreeResult<T> = Result<T, TreeError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("invalid category name {name:?}: empty or digits-only names are not allowed")]
    InvalidName { name: String },
    #[error("a sibling named {name:?} already exists")]
    DuplicateName { name: String },
    #[error("depth limit reached: level {MAX_LEVEL} categories cannot hold further nesting")]
    DepthExceeded,
    #[error("cannot move a category onto itself")]
    SelfMove,
    #[error("cannot move a category into its own descendant")]
    CycleDetected,
    #[error("no valid position for the moved category")]
    NoValidPosition,
    #[error("category has children; leaf fields only apply to leaf categories")]
    NotALeaf,
    #[error("no category at {path}")]
    NotFound { path: String },
}

/// Key chain from the root category map down to one node (1 to 3 segments).
/// Keys are unique within each map, so a path identifies exactly one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    pub fn top(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Builds a path from segments; `None` when the chain is empty or
    /// deeper than the tree allows.
    pub fn new(segments: Vec<String>) -> Option<Self> {
        if segments.is_empty() || segments.len() > MAX_LEVEL + 1 {
            return None;
        }
        Some(Self { segments })
    }

    pub fn child(&self, name: impl Into<String>) -> Option<Self> {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self::new(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn level(&self) -> usize {
        self.segments.len() - 1
    }

    pub fn last(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn parent_segments(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.segments.join(" / "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// The child map owned by the node at `prefix` (the root map for an empty
/// prefix). Level-0 nodes nest through `subcategories`, level-1 nodes
/// through `subsubcategories`, level-2 nodes through nothing.
pub fn map_at<'a>(world: &'a World, prefix: &[String]) -> Option<&'a CategoryMap> {
    match prefix {
        [] => Some(&world.categories),
        [top] => world.categories.get(top).map(|node| &node.subcategories),
        [top, sub] => world
            .categories
            .get(top)?
            .subcategories
            .get(sub)
            .map(|node| &node.subsubcategories),
        _ => None,
    }
}

pub fn map_at_mut<'a>(world: &'a mut World, prefix: &[String]) -> Option<&'a mut CategoryMap> {
    match prefix {
        [] => Some(&mut world.categories),
        [top] => world
            .categories
            .get_mut(top)
            .map(|node| &mut node.subcategories),
        [top, sub] => world
            .categories
            .get_mut(top)?
            .subcategories
            .get_mut(sub)
            .map(|node| &mut node.subsubcategories),
        _ => None,
    }
}

pub fn node<'a>(world: &'a World, path: &TreePath) -> Option<&'a Category> {
    map_at(world, path.parent_segments())?.get(path.last())
}

pub fn node_mut<'a>(world: &'a mut World, path: &TreePath) -> Option<&'a mut Category> {
    map_at_mut(world, path.parent_segments())?.get_mut(path.last())
}

/// First node with the given key, in depth-first map order. The document
/// stores no parent back-references, so name lookups re-scan the tree.
pub fn find_by_name(world: &World, name: &str) -> Option<TreePath> {
    for (top_key, top) in &world.categories {
        let top_path = TreePath::top(top_key.clone());
        if top_key == name {
            return Some(top_path);
        }
        for (sub_key, sub) in &top.subcategories {
            let sub_path = top_path.child(sub_key.clone())?;
            if sub_key == name {
                return Some(sub_path);
            }
            for leaf_key in sub.subsubcategories.keys() {
                if leaf_key == name {
                    return sub_path.child(leaf_key.clone());
                }
            }
        }
    }
    None
}

/// Paths of every leaf still flagged `is_new` with a non-empty
/// `items_url`, in depth-first order. These are the leaves whose item
/// files must be created during a save.
pub fn collect_new_leaves(world: &World) -> Vec<TreePath> {
    fn walk(map: &CategoryMap, base: &[String], out: &mut Vec<TreePath>) {
        for (key, node) in map {
            let mut segments = base.to_vec();
            segments.push(key.clone());
            if node.is_new && node.items_url.as_deref().is_some_and(|url| !url.is_empty())
                && let Some(path) = TreePath::new(segments.clone())
            {
                out.push(path);
            }
            walk(&node.subcategories, &segments, out);
            walk(&node.subsubcategories, &segments, out);
        }
    }

    let mut out = Vec::new();
    walk(&world.categories, &[], &mut out);
    out
}

pub fn add_top_level(world: &mut World, world_id: &str, name: &str) -> TreeResult<TreePath> {
    validate_name(name)?;
    if world.categories.contains_key(name) {
        return Err(TreeError::DuplicateName {
            name: name.to_string(),
        });
    }
    let items_url = format!("data/{world_id}/{name}/{name}.json");
    world
        .categories
        .insert(name.to_string(), Category::new_leaf(items_url));
    Ok(TreePath::top(name))
}

/// Adds a new leaf under a level-0 or level-1 parent. The parent stops
/// being a leaf: its own `description`/`items_url` are dropped.
pub fn add_child(
    world: &mut World,
    world_id: &str,
    parent_path: &TreePath,
    name: &str,
) -> TreeResult<TreePath> {
    validate_name(name)?;
    if parent_path.level() >= MAX_LEVEL {
        return Err(TreeError::DepthExceeded);
    }
    let parent_key = parent_path.last().to_string();
    let parent_level = parent_path.level();
    let parent = node_mut(world, parent_path).ok_or_else(|| not_found(parent_path))?;

    let child_map = match parent_level {
        0 => &parent.subcategories,
        _ => &parent.subsubcategories,
    };
    if child_map.contains_key(name) {
        return Err(TreeError::DuplicateName {
            name: name.to_string(),
        });
    }

    parent.clear_leaf_fields();
    let items_url = format!("data/{world_id}/{parent_key}/{name}/{name}.json");
    let child = Category::new_leaf(items_url);
    match parent_level {
        0 => parent.subcategories.insert(name.to_string(), child),
        _ => parent.subsubcategories.insert(name.to_string(), child),
    };
    parent_path
        .child(name.to_string())
        .ok_or(TreeError::DepthExceeded)
}

/// Renames a node in place: the parent map keeps every entry at its
/// current position, only the key changes. Renaming to the same name is
/// a no-op.
pub fn rename(world: &mut World, path: &TreePath, new_name: &str) -> TreeResult<TreePath> {
    let old_name = path.last().to_string();
    if node(world, path).is_none() {
        return Err(not_found(path));
    }
    if new_name == old_name {
        return Ok(path.clone());
    }
    validate_name(new_name)?;

    let map = map_at_mut(world, path.parent_segments()).ok_or_else(|| not_found(path))?;
    if map.contains_key(new_name) {
        return Err(TreeError::DuplicateName {
            name: new_name.to_string(),
        });
    }
    let index = map.get_index_of(&old_name).ok_or_else(|| not_found(path))?;
    let (_, value) = map.shift_remove_entry(&old_name).ok_or_else(|| not_found(path))?;
    map.shift_insert(index, new_name.to_string(), value);

    let mut segments = path.parent_segments().to_vec();
    segments.push(new_name.to_string());
    TreePath::new(segments).ok_or(TreeError::DepthExceeded)
}

/// Overwrites a leaf's `description` and `items_url` verbatim.
pub fn update_leaf_fields(
    world: &mut World,
    path: &TreePath,
    description: &str,
    items_url: &str,
) -> TreeResult<()> {
    let target = node_mut(world, path).ok_or_else(|| not_found(path))?;
    if target.has_children() {
        return Err(TreeError::NotALeaf);
    }
    target.description = Some(description.to_string());
    target.items_url = Some(items_url.to_string());
    Ok(())
}

/// Deletes the node and its whole subtree, returning it.
pub fn remove(world: &mut World, path: &TreePath) -> TreeResult<Category> {
    let map = map_at_mut(world, path.parent_segments()).ok_or_else(|| not_found(path))?;
    map.shift_remove(path.last()).ok_or_else(|| not_found(path))
}

/// Reparents `source` relative to `target`. Drop policy, in order:
/// self-drops and drops into the source's own subtree fail; a level-0/1
/// target receives the source as its last child when the subtree fits
/// the depth limit; otherwise the source lands as a sibling immediately
/// after the target. Removal and insertion are atomic: every failure
/// leaves the tree untouched.
pub fn move_node(world: &mut World, source: &TreePath, target: &TreePath) -> TreeResult<()> {
    if source == target {
        return Err(TreeError::SelfMove);
    }
    if node(world, target).is_none() {
        return Err(not_found(target));
    }
    let source_node = node(world, source).ok_or_else(|| not_found(source))?;
    if source.is_ancestor_of(target) {
        return Err(TreeError::CycleDetected);
    }

    let height = subtree_height(source_node);
    let target_level = target.level();
    let key = source.last().to_string();

    // Child placement applies only when the whole moved subtree fits
    // below the target; otherwise fall through to sibling placement.
    let as_child = target_level < MAX_LEVEL && target_level + height <= MAX_LEVEL;
    if !as_child && target_level + height - 1 > MAX_LEVEL {
        return Err(TreeError::DepthExceeded);
    }

    if as_child {
        let target_node = node(world, target).ok_or(TreeError::NoValidPosition)?;
        let child_map = match target_level {
            0 => &target_node.subcategories,
            _ => &target_node.subsubcategories,
        };
        let source_already_there = source.parent_segments() == target.segments();
        if child_map.contains_key(&key) && !source_already_there {
            return Err(TreeError::DuplicateName { name: key });
        }
    } else {
        let sibling_map = map_at(world, target.parent_segments()).ok_or(TreeError::NoValidPosition)?;
        let source_already_there = source.parent_segments() == target.parent_segments();
        if sibling_map.contains_key(&key) && !source_already_there {
            return Err(TreeError::DuplicateName { name: key });
        }
    }

    // All checks passed; removal and insertion can no longer fail.
    let source_map = map_at_mut(world, source.parent_segments()).ok_or_else(|| not_found(source))?;
    let (_, mut moved) = source_map
        .shift_remove_entry(&key)
        .ok_or_else(|| not_found(source))?;
    if moved.has_children() {
        moved.clear_leaf_fields();
    }

    if as_child {
        let target_node = node_mut(world, target).ok_or(TreeError::NoValidPosition)?;
        if target_node.is_leaf() {
            // gaining its first child turns the target into a branch
            target_node.clear_leaf_fields();
        }
        match target_level {
            0 => target_node.subcategories.insert(key, moved),
            _ => target_node.subsubcategories.insert(key, moved),
        };
    } else {
        // index looked up after the removal, so same-map shifts are
        // already accounted for
        let sibling_map =
            map_at_mut(world, target.parent_segments()).ok_or(TreeError::NoValidPosition)?;
        let target_index = sibling_map
            .get_index_of(target.last())
            .ok_or(TreeError::NoValidPosition)?;
        sibling_map.shift_insert(target_index + 1, key, moved);
    }
    Ok(())
}

/// Swaps the node with its adjacent sibling; a swap past either end of
/// the map is a no-op.
pub fn reorder(world: &mut World, path: &TreePath, direction: Direction) -> TreeResult<()> {
    let map = map_at_mut(world, path.parent_segments()).ok_or_else(|| not_found(path))?;
    let index = map.get_index_of(path.last()).ok_or_else(|| not_found(path))?;
    let swap_with = match direction {
        Direction::Up if index > 0 => index - 1,
        Direction::Down if index + 1 < map.len() => index + 1,
        _ => return Ok(()),
    };
    map.swap_indices(index, swap_with);
    Ok(())
}

/// Height of a subtree: 1 for a leaf, 1 + tallest child otherwise.
pub fn subtree_height(category: &Category) -> usize {
    let children = category
        .subcategories
        .values()
        .chain(category.subsubcategories.values())
        .map(subtree_height)
        .max()
        .unwrap_or(0);
    1 + children
}

fn validate_name(name: &str) -> TreeResult<()> {
    if name.is_empty() || name.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(TreeError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn not_found(path: &TreePath) -> TreeError {
    TreeError::NotFound {
        path: path.to_string(),
    }
}
