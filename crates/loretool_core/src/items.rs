use anyhow::{Context, Result, bail};

use crate::document::{Category, Item};
use crate::store::{ContentStore, StoreError, load_document, save_document};

/// Item-list editing for a leaf category. Each operation loads the
/// leaf's item file, applies one change, and writes the whole list
/// back, so document order is the list order the editor sees.

fn items_url(leaf: &Category) -> Result<&str> {
    leaf.items_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .context("category has no item file")
}

/// Like `viewer::load_items`, but a missing file is an empty list: a
/// leaf added in the current editing session has no asset file until
/// the world is saved.
fn load_for_edit<S: ContentStore + ?Sized>(store: &S, url: &str) -> Result<Vec<Item>> {
    match load_document(store, url) {
        Ok(items) => Ok(items),
        Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
        Err(err) => Err(err).with_context(|| format!("failed to load items from {url}")),
    }
}

/// Appends a new item to the leaf's item file.
pub fn add_item<S: ContentStore + ?Sized>(store: &S, leaf: &Category, item: Item) -> Result<()> {
    let name = item.name.trim().to_string();
    if name.is_empty() {
        bail!("item name cannot be empty");
    }
    let url = items_url(leaf)?;
    let mut items = load_for_edit(store, url)?;
    if items.iter().any(|existing| existing.name == name) {
        bail!("an item named {name:?} already exists");
    }
    items.push(Item { name, ..item });
    save_document(store, url, &items).with_context(|| format!("failed to write {url}"))?;
    Ok(())
}

/// Updates the summary and/or full text of an existing item. Fields not
/// given keep their current value, and fields this editor does not touch
/// (sidebar, galleries) pass through untouched.
pub fn update_item<S: ContentStore + ?Sized>(
    store: &S,
    leaf: &Category,
    name: &str,
    summary: Option<&str>,
    full_data: Option<&str>,
) -> Result<()> {
    let url = items_url(leaf)?;
    let mut items = load_for_edit(store, url)?;
    let item = items
        .iter_mut()
        .find(|item| item.name == name)
        .with_context(|| format!("no item named {name:?}"))?;
    if let Some(summary) = summary {
        item.summary = summary.to_string();
    }
    if let Some(full_data) = full_data {
        item.full_data = full_data.to_string();
    }
    save_document(store, url, &items).with_context(|| format!("failed to write {url}"))?;
    Ok(())
}

/// Removes an item by name, returning the removed entry.
pub fn remove_item<S: ContentStore + ?Sized>(
    store: &S,
    leaf: &Category,
    name: &str,
) -> Result<Item> {
    let url = items_url(leaf)?;
    let mut items = load_for_edit(store, url)?;
    let position = items
        .iter()
        .position(|item| item.name == name)
        .with_context(|| format!("no item named {name:?}"))?;
    let removed = items.remove(position);
    save_document(store, url, &items).with_context(|| format!("failed to write {url}"))?;
    Ok(removed)
}
