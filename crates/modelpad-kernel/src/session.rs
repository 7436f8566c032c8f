//! Generation session registry and undo of AI-authored content.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use modelpad_doc::{Document, NodeKey};
use modelpad_types::{NodeKind, PromptGeneration, PromptId, SessionUpdate, StoryId};

use crate::error::{SessionError, SessionResult};

/// Sessions by prompt id, in creation order.
///
/// Nothing is evicted; sessions live until [`remove`](Self::remove).
#[derive(Debug, Default, Clone)]
pub struct SessionRegistry {
    sessions: IndexMap<PromptId, PromptGeneration>,
}

/// Registry shared between the generator and the UI layer.
pub type SharedSessions = Arc<Mutex<SessionRegistry>>;

pub fn shared_sessions() -> SharedSessions {
    Arc::new(Mutex::new(SessionRegistry::new()))
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, replacing any with the same prompt id.
    pub fn add(&mut self, session: PromptGeneration) -> PromptId {
        let id = session.prompt_id;
        debug!(prompt_id = %id, story_id = %session.story_id, "session added");
        self.sessions.insert(id, session);
        id
    }

    /// Apply a partial update. Unknown ids are ignored.
    pub fn update(&mut self, id: PromptId, update: SessionUpdate) -> Option<&PromptGeneration> {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.apply(update);
                Some(session)
            }
            None => {
                warn!(prompt_id = %id, "update for unknown session");
                None
            }
        }
    }

    pub fn remove(&mut self, id: PromptId) -> Option<PromptGeneration> {
        self.sessions.shift_remove(&id)
    }

    pub fn get(&self, id: PromptId) -> Option<&PromptGeneration> {
        self.sessions.get(&id)
    }

    pub fn sessions_for_story(&self, story_id: StoryId) -> Vec<&PromptGeneration> {
        self.sessions
            .values()
            .filter(|s| s.story_id == story_id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PromptGeneration> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Undo a session's effect on `doc`.
    ///
    /// Removes every generated node still in the tree, pruning containers
    /// left empty. If the prompt node itself is gone (it was replaced), its
    /// original content comes back as paragraphs where the generated content
    /// started, or at the end of the document.
    pub fn revert_generation(&mut self, doc: &mut Document, id: PromptId) -> SessionResult<()> {
        let session = self.sessions.get(&id).ok_or(SessionError::NotFound(id))?;
        if !session.can_undo {
            return Err(SessionError::NotUndoable(id));
        }
        let prompt_key = session.prompt_node_key;
        let generated = session.generated_node_keys.clone();
        let original = session.original_content.clone();

        doc.update(|tx| -> SessionResult<()> {
            let live: Vec<NodeKey> = generated
                .iter()
                .copied()
                .filter(|k| tx.is_attached(*k))
                .collect();
            let prompt_alive = tx.is_attached(prompt_key);

            if !prompt_alive && !original.is_empty() {
                let anchor = live.first().and_then(|k| tx.top_level_ancestor(*k));
                for block in original.split("\n\n") {
                    let (p, _) = tx.create_paragraph_with(NodeKind::text(block));
                    match anchor {
                        Some(a) => tx.insert_before(a, p)?,
                        None => {
                            let root = tx.root();
                            tx.append_child(root, p)?;
                        }
                    }
                }
            }

            let keep = prompt_alive.then_some(prompt_key);
            for key in live {
                if tx.exists(key) {
                    tx.remove_pruning(key, keep)?;
                }
            }
            Ok(())
        })?;

        self.update(
            id,
            SessionUpdate {
                generated_node_keys: Some(Vec::new()),
                can_undo: Some(false),
                can_redo: Some(true),
                ..Default::default()
            },
        );
        info!(prompt_id = %id, "generation reverted");
        Ok(())
    }
}
