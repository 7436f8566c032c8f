//! Tag registry.
//!
//! Tags are keyed by id and addressed by path. Every proper prefix of a
//! tag's path has its own category tag, created on demand. The registry
//! persists as a JSON array of tags.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use modelpad_doc::{DocumentTree, extract_tag_refs};
use modelpad_types::{NodeKind, Tag, TagId, TagPatch, normalize_path, now_rfc3339};

use super::{TagError, TagResult};

pub type SharedTags = Arc<Mutex<TagRegistry>>;

pub fn shared_tags(registry: TagRegistry) -> SharedTags {
    Arc::new(Mutex::new(registry))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Tag>", into = "Vec<Tag>")]
pub struct TagRegistry {
    tags: IndexMap<TagId, Tag>,
}

impl From<Vec<Tag>> for TagRegistry {
    fn from(tags: Vec<Tag>) -> Self {
        let mut registry = Self::default();
        for tag in tags {
            if registry.find_by_name(&tag.name).is_some() {
                warn!(name = %tag.name, "duplicate tag path dropped");
                continue;
            }
            registry.tags.insert(tag.id, tag);
        }
        registry
    }
}

impl From<TagRegistry> for Vec<Tag> {
    fn from(registry: TagRegistry) -> Self {
        registry.tags.into_values().collect()
    }
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file. A missing file is an empty registry.
    pub fn load(path: &Path) -> TagResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let registry: Self = serde_json::from_str(&content)?;
        debug!(path = %path.display(), count = registry.len(), "tags loaded");
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> TagResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn get_tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    /// Tag whose full path is `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Tag> {
        self.tags.values().find(|t| t.name == name)
    }

    /// Create the tag at `path` and any missing categories above it.
    /// An existing tag at that path is returned unchanged.
    pub fn add_hierarchical_tag(&mut self, path: &str) -> TagResult<Tag> {
        let segments = normalize_path(path);
        if segments.is_empty() {
            return Err(TagError::EmptyPath);
        }
        if let Some(existing) = self.find_by_name(&segments.join("/")) {
            return Ok(existing.clone());
        }
        self.ensure_parent_categories(&segments);
        let tag = Tag::new(segments);
        info!(name = %tag.name, id = %tag.id, "tag created");
        self.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    /// Create a category tag for every proper prefix of `path` that has no
    /// tag yet. Returns how many were created.
    pub fn ensure_parent_categories(&mut self, path: &[String]) -> usize {
        let mut created = 0;
        for depth in 1..path.len() {
            let prefix = &path[..depth];
            if self.find_by_name(&prefix.join("/")).is_none() {
                let category = Tag::category(prefix.to_vec());
                debug!(name = %category.name, "category created");
                self.tags.insert(category.id, category);
                created += 1;
            }
        }
        created
    }

    /// Case-insensitive search over full paths and single segments.
    ///
    /// Ranked exact match first, then prefix matches, then by total usage
    /// (descending), then by name. An empty query returns every tag.
    pub fn search_tags_by_path(&self, query: &str) -> Vec<&Tag> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.tags.values().collect();
        }

        let usage = self.usage_totals();
        let mut hits: Vec<(&Tag, String)> = self
            .tags
            .values()
            .filter_map(|t| {
                let name = t.name.to_lowercase();
                let hit = name.contains(&query)
                    || t.path.iter().any(|s| s.to_lowercase().contains(&query));
                hit.then_some((t, name))
            })
            .collect();

        hits.sort_by(|(a, a_name), (b, b_name)| {
            let rank = |name: &str, tag: &Tag| {
                (
                    name != query,
                    !name.starts_with(&query),
                    Reverse(usage.get(&tag.id).copied().unwrap_or(0)),
                )
            };
            rank(a_name, a)
                .cmp(&rank(b_name, b))
                .then_with(|| a_name.cmp(b_name))
                .then_with(|| a.name.cmp(&b.name))
        });
        hits.into_iter().map(|(t, _)| t).collect()
    }

    pub fn search_tags(&self, query: &str) -> Vec<&Tag> {
        self.search_tags_by_path(query)
    }

    /// Count one placement of the tag into a document.
    pub fn increment_tag_usage(&mut self, id: TagId) -> TagResult<u64> {
        let tag = self.tags.get_mut(&id).ok_or(TagError::NotFound(id))?;
        tag.usage_count += 1;
        tag.last_used_at = Some(now_rfc3339());
        debug!(name = %tag.name, usage = tag.usage_count, "tag used");
        Ok(tag.usage_count)
    }

    /// Tags exactly one segment below `parent`.
    pub fn get_child_tags(&self, parent: &Tag) -> Vec<&Tag> {
        self.tags_by_parent_path(&parent.path)
    }

    pub fn tags_by_parent_path(&self, parent_path: &[String]) -> Vec<&Tag> {
        self.tags
            .values()
            .filter(|t| t.path.len() == parent_path.len() + 1 && t.path.starts_with(parent_path))
            .collect()
    }

    /// Own usage plus the usage of every tag below it.
    pub fn total_usage(&self, id: TagId) -> u64 {
        let Some(tag) = self.tags.get(&id) else {
            return 0;
        };
        tag.usage_count
            + self
                .tags
                .values()
                .filter(|t| tag.is_ancestor_of(t))
                .map(|t| t.usage_count)
                .sum::<u64>()
    }

    fn usage_totals(&self) -> HashMap<TagId, u64> {
        let mut totals: HashMap<TagId, u64> = HashMap::with_capacity(self.tags.len());
        for tag in self.tags.values() {
            *totals.entry(tag.id).or_default() += tag.usage_count;
            if tag.usage_count == 0 {
                continue;
            }
            for other in self.tags.values() {
                if other.is_ancestor_of(tag) {
                    *totals.entry(other.id).or_default() += tag.usage_count;
                }
            }
        }
        totals
    }

    /// Apply a patch. A new path keeps `name == path.join("/")` and gets its
    /// categories. Tags below the renamed one move with it; none of the
    /// moved paths may collide with a tag that stays put.
    pub fn update_tag(&mut self, id: TagId, patch: TagPatch) -> TagResult<&Tag> {
        let old_path = match self.tags.get(&id) {
            Some(tag) => tag.path.clone(),
            None => return Err(TagError::NotFound(id)),
        };
        if let Some(path) = patch.target_path() {
            if path.is_empty() {
                return Err(TagError::EmptyPath);
            }
            if path != old_path {
                self.move_subtree(id, &old_path, path)?;
            }
        }
        let tag = self.tags.get_mut(&id).ok_or(TagError::NotFound(id))?;
        if let Some(color) = patch.color {
            tag.color = color;
        }
        Ok(tag)
    }

    fn move_subtree(&mut self, id: TagId, old_path: &[String], new_path: Vec<String>) -> TagResult<()> {
        if new_path.starts_with(old_path) {
            return Err(TagError::IntoOwnSubtree(new_path.join("/")));
        }
        let moves: Vec<(TagId, Vec<String>)> = self
            .tags
            .values()
            .filter(|t| t.id == id || t.path.starts_with(old_path))
            .map(|t| {
                let mut path = new_path.clone();
                path.extend_from_slice(&t.path[old_path.len()..]);
                (t.id, path)
            })
            .collect();

        for (_, path) in &moves {
            let name = path.join("/");
            let taken = self
                .find_by_name(&name)
                .is_some_and(|other| !moves.iter().any(|(moved, _)| *moved == other.id));
            if taken {
                return Err(TagError::PathTaken(name));
            }
        }

        let count = moves.len();
        for (moved, path) in moves {
            if let Some(tag) = self.tags.get_mut(&moved) {
                tag.name = path.join("/");
                tag.path = path;
            }
        }
        self.ensure_parent_categories(&new_path);
        info!(from = %old_path.join("/"), to = %new_path.join("/"), count, "tags moved");
        Ok(())
    }

    /// Remove a registry entry. Tag nodes already placed in documents keep
    /// their snapshot and are not touched.
    pub fn delete_tag(&mut self, id: TagId) -> Option<Tag> {
        let removed = self.tags.shift_remove(&id);
        if let Some(tag) = &removed {
            info!(name = %tag.name, "tag deleted");
        }
        removed
    }

    /// Re-register every tag a document refers to that the registry no
    /// longer has, under its original id. Returns the restored ids.
    pub fn sync_from_document(&mut self, tree: &DocumentTree) -> Vec<TagId> {
        let refs: Vec<(TagId, Vec<String>, Option<String>)> = tree
            .find_all(|k| matches!(k, NodeKind::Tag(_)))
            .into_iter()
            .filter_map(|key| match tree.kind(key) {
                Some(NodeKind::Tag(data)) => {
                    Some((data.tag_id, data.tag_path.clone(), data.tag_color.clone()))
                }
                _ => None,
            })
            .collect();
        refs.into_iter()
            .filter_map(|(id, path, color)| self.restore(id, path, color))
            .collect()
    }

    /// [`sync_from_document`](Self::sync_from_document) over a serialized
    /// document body.
    pub fn sync_from_body(&mut self, body: &str) -> Vec<TagId> {
        extract_tag_refs(body)
            .into_iter()
            .filter_map(|r| self.restore(r.id, r.path, None))
            .collect()
    }

    fn restore(&mut self, id: TagId, path: Vec<String>, color: Option<String>) -> Option<TagId> {
        if self.tags.contains_key(&id) {
            return None;
        }
        let path: Vec<String> = path.iter().flat_map(|s| normalize_path(s)).collect();
        if path.is_empty() {
            return None;
        }
        let name = path.join("/");
        if let Some(other) = self.find_by_name(&name) {
            debug!(%name, existing = %other.id, missing = %id, "path already registered under another id");
            return None;
        }
        self.ensure_parent_categories(&path);
        let tag = Tag {
            id,
            color,
            ..Tag::new(path)
        };
        info!(name = %tag.name, %id, "tag restored from document");
        self.tags.insert(id, tag);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use modelpad_doc::Document;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn names(tags: &[&Tag]) -> Vec<String> {
        tags.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_hierarchical_create_is_idempotent() {
        let mut reg = TagRegistry::new();
        let first = reg.add_hierarchical_tag("a/b/c").unwrap();
        let second = reg.add_hierarchical_tag(" a / b /c/ ").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(reg.len(), 3);
        assert!(reg.find_by_name("a").unwrap().is_category);
        assert!(reg.find_by_name("a/b").unwrap().is_category);
        assert!(!first.is_category);
        assert_eq!(reg.find_by_name("a").unwrap().usage_count, 0);
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut reg = TagRegistry::new();
        assert!(matches!(reg.add_hierarchical_tag(" / "), Err(TagError::EmptyPath)));
    }

    #[test]
    fn test_search_ranking() {
        let mut reg = TagRegistry::new();
        reg.add_hierarchical_tag("project/ai").unwrap();
        reg.add_hierarchical_tag("air").unwrap();
        reg.add_hierarchical_tag("ai").unwrap();
        assert_eq!(names(&reg.search_tags_by_path("AI")), vec!["ai", "air", "project/ai"]);
        assert_eq!(reg.search_tags_by_path("").len(), 4);
        assert!(reg.search_tags("zzz").is_empty());
    }

    #[test]
    fn test_usage_breaks_ties_before_name() {
        let mut reg = TagRegistry::new();
        let alpha = reg.add_hierarchical_tag("people/alpha").unwrap();
        let beta = reg.add_hierarchical_tag("people/beta").unwrap();
        reg.increment_tag_usage(beta.id).unwrap();
        assert_eq!(names(&reg.search_tags("people/")), vec!["people/beta", "people/alpha"]);
        reg.increment_tag_usage(alpha.id).unwrap();
        reg.increment_tag_usage(alpha.id).unwrap();
        assert_eq!(names(&reg.search_tags("people/")), vec!["people/alpha", "people/beta"]);
        assert!(reg.get_tag(alpha.id).unwrap().last_used_at.is_some());
    }

    #[test]
    fn test_children_and_total_usage() {
        let mut reg = TagRegistry::new();
        let ada = reg.add_hierarchical_tag("people/ada").unwrap();
        let bob = reg.add_hierarchical_tag("people/bob").unwrap();
        reg.add_hierarchical_tag("people/bob/jr").unwrap();
        reg.increment_tag_usage(ada.id).unwrap();
        reg.increment_tag_usage(bob.id).unwrap();

        let people = reg.find_by_name("people").unwrap().clone();
        assert_eq!(names(&reg.get_child_tags(&people)), vec!["people/ada", "people/bob"]);
        assert_eq!(reg.total_usage(people.id), 2);
        assert_eq!(reg.total_usage(ada.id), 1);
        assert_eq!(reg.total_usage(TagId::new()), 0);
    }

    #[test]
    fn test_update_tag_keeps_name_and_path_in_step() {
        let mut reg = TagRegistry::new();
        let tag = reg.add_hierarchical_tag("old").unwrap();
        reg.add_hierarchical_tag("taken").unwrap();

        let updated = reg.update_tag(tag.id, TagPatch::rename("new/place")).unwrap();
        assert_eq!(updated.name, "new/place");
        assert_eq!(updated.path, vec!["new", "place"]);
        assert!(reg.find_by_name("new").unwrap().is_category);

        assert!(matches!(
            reg.update_tag(tag.id, TagPatch::rename("taken")),
            Err(TagError::PathTaken(_))
        ));
        let colored = reg.update_tag(tag.id, TagPatch::color(Some("#0af".into()))).unwrap();
        assert_eq!(colored.color.as_deref(), Some("#0af"));
        assert!(matches!(
            reg.update_tag(TagId::new(), TagPatch::color(None)),
            Err(TagError::NotFound(_))
        ));
    }

    #[test]
    fn test_rename_moves_children() {
        let mut reg = TagRegistry::new();
        let child = reg.add_hierarchical_tag("a/b/c").unwrap();
        let a = reg.find_by_name("a").unwrap().id;
        reg.add_hierarchical_tag("other").unwrap();

        reg.update_tag(a, TagPatch::rename("z")).unwrap();

        let mut names: Vec<&str> = reg.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["other", "z", "z/b", "z/b/c"]);
        assert_eq!(reg.get_tag(child.id).unwrap().path, vec!["z", "b", "c"]);
        for tag in reg.iter() {
            if let Some(parent) = tag.parent_path() {
                assert!(reg.find_by_name(&parent.join("/")).is_some(), "{} lost its parent", tag.name);
            }
        }
        let z = reg.get_tag(a).unwrap();
        assert_eq!(z.name, "z");
        assert_eq!(reg.get_child_tags(z).len(), 1);
    }

    #[test]
    fn test_rename_refuses_colliding_children() {
        let mut reg = TagRegistry::new();
        reg.add_hierarchical_tag("a/b").unwrap();
        reg.add_hierarchical_tag("z/b").unwrap();
        let a = reg.find_by_name("a").unwrap().id;

        assert!(matches!(
            reg.update_tag(a, TagPatch::rename("z")),
            Err(TagError::PathTaken(_))
        ));
        assert!(matches!(
            reg.update_tag(a, TagPatch::rename("a/b/deeper")),
            Err(TagError::IntoOwnSubtree(_))
        ));
        assert!(reg.find_by_name("a/b").is_some());
        assert!(reg.find_by_name("z/b").is_some());
    }

    #[test]
    fn test_delete_does_not_touch_documents() {
        let mut reg = TagRegistry::new();
        let tag = reg.add_hierarchical_tag("x/y").unwrap();
        let mut doc = Document::new();
        doc.update(|tx| {
            let (p, _) = tx.create_paragraph_with(NodeKind::Tag(tag.to_node_data()));
            let root = tx.root();
            tx.append_child(root, p).unwrap();
        });

        assert!(reg.delete_tag(tag.id).is_some());
        assert!(reg.get_tag(tag.id).is_none());
        assert_eq!(doc.plain_text(), "@x/y");

        let restored = reg.sync_from_document(doc.tree());
        assert_eq!(restored, vec![tag.id]);
        assert_eq!(reg.get_tag(tag.id).unwrap().name, "x/y");
        assert!(reg.sync_from_document(doc.tree()).is_empty());
    }

    #[test]
    fn test_sync_from_body() {
        let mut reg = TagRegistry::new();
        let tag = Tag::new(vec!["lore".into(), "dragons".into()]);
        let mut doc = Document::new();
        doc.update(|tx| {
            let (p, _) = tx.create_paragraph_with(NodeKind::Tag(tag.to_node_data()));
            let root = tx.root();
            tx.append_child(root, p).unwrap();
        });
        let body = doc.to_json().unwrap();
        assert_eq!(reg.sync_from_body(&body), vec![tag.id]);
        assert!(reg.find_by_name("lore").unwrap().is_category);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.json");
        assert!(TagRegistry::load(&path).unwrap().is_empty());

        let mut reg = TagRegistry::new();
        reg.add_hierarchical_tag("a/b").unwrap();
        reg.save(&path).unwrap();
        let loaded = TagRegistry::load(&path).unwrap();
        assert_eq!(loaded, reg);
        assert_eq!(names(&loaded.iter().collect::<Vec<_>>()), vec!["a", "a/b"]);
    }
}
