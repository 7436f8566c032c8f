//! Streaming insertion state machine.
//!
//! One engine serves one generation call. Tokens are buffered in arrival
//! order; the owner schedules a flush when [`InsertionEngine::push_token`]
//! asks for one, and each flush writes the whole buffer in a single document
//! update. Exactly one text leaf is "live" at a time.

use tracing::{debug, info, warn};

use modelpad_doc::{DocError, Document, NodeKey, Selection, Transaction};
use modelpad_types::{InsertionStrategy, NodeKind};

use super::placement::{self, Placement};

/// Lifecycle of one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Started,
    Streaming,
    Completed,
    Cancelled,
}

impl EnginePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// What one flush did to the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Characters written.
    pub written: usize,
    /// A leaf the engine created (first placement or re-anchoring).
    pub created: Option<NodeKey>,
    /// The live leaf was gone and writing resumed elsewhere.
    pub recovered: bool,
    /// The strategy's target was missing at placement.
    pub degraded: bool,
}

/// Statistics about the engine's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub phase: EnginePhase,
    pub buffered_bytes: usize,
    pub flushes: usize,
    pub generated: usize,
}

pub struct InsertionEngine {
    strategy: InsertionStrategy,
    phase: EnginePhase,
    buffer: String,
    flush_pending: bool,
    live: Option<NodeKey>,
    container: Option<NodeKey>,
    generated: Vec<NodeKey>,
    mark_output: bool,
    flushes: usize,
}

impl InsertionEngine {
    pub fn new(strategy: InsertionStrategy) -> Self {
        Self {
            strategy,
            phase: EnginePhase::Idle,
            buffer: String::new(),
            flush_pending: false,
            live: None,
            container: None,
            generated: Vec::new(),
            mark_output: false,
            flushes: 0,
        }
    }

    /// Write output into `ai-generation` leaves instead of plain text.
    pub fn with_output_marking(mut self, mark: bool) -> Self {
        self.mark_output = mark;
        self
    }

    pub fn strategy(&self) -> &InsertionStrategy {
        &self.strategy
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn live_node(&self) -> Option<NodeKey> {
        self.live
    }

    pub fn container(&self) -> Option<NodeKey> {
        self.container
    }

    /// Leaves this engine created, in creation order.
    pub fn generated_keys(&self) -> &[NodeKey] {
        &self.generated
    }

    pub fn flush_pending(&self) -> bool {
        self.flush_pending
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            phase: self.phase,
            buffered_bytes: self.buffer.len(),
            flushes: self.flushes,
            generated: self.generated.len(),
        }
    }

    /// The provider started streaming. Returns false if already started.
    pub fn on_start(&mut self) -> bool {
        if self.phase != EnginePhase::Idle {
            return false;
        }
        self.phase = EnginePhase::Started;
        info!(strategy = %self.strategy, "insertion started");
        true
    }

    /// Buffer a token. Returns true when the caller should schedule a flush;
    /// false while one is already pending or after the call ended.
    pub fn push_token(&mut self, text: &str) -> bool {
        if self.phase.is_terminal() {
            debug!("token after end of insertion dropped");
            return false;
        }
        self.phase = EnginePhase::Streaming;
        self.buffer.push_str(text);
        if self.flush_pending {
            return false;
        }
        self.flush_pending = true;
        true
    }

    /// Write the buffer into the document in one update.
    pub fn flush(&mut self, doc: &mut Document) -> FlushOutcome {
        self.flush_pending = false;
        if self.buffer.is_empty() {
            return FlushOutcome::default();
        }
        let text = std::mem::take(&mut self.buffer);
        let outcome = doc.update(|tx| self.write(tx, &text));
        self.flushes += 1;
        debug!(
            written = outcome.written,
            recovered = outcome.recovered,
            live = ?self.live,
            "flushed"
        );
        outcome
    }

    /// Flush what is left and finish normally.
    pub fn complete(&mut self, doc: &mut Document) -> FlushOutcome {
        if self.phase.is_terminal() {
            return FlushOutcome::default();
        }
        let outcome = self.flush(doc);
        if self.mark_output {
            let generated = self.generated.clone();
            doc.update(|tx| {
                for key in generated {
                    if let Ok(NodeKind::AiGeneration(data)) = tx.kind_mut(key) {
                        data.completed = true;
                    }
                }
            });
        }
        self.finish(EnginePhase::Completed);
        outcome
    }

    /// Stop accepting tokens. A flush already requested still commits its
    /// buffered text; nothing written earlier is rolled back.
    pub fn cancel(&mut self, doc: &mut Document) -> FlushOutcome {
        if self.phase.is_terminal() {
            return FlushOutcome::default();
        }
        let outcome = if self.flush_pending {
            self.flush(doc)
        } else {
            FlushOutcome::default()
        };
        self.finish(EnginePhase::Cancelled);
        outcome
    }

    fn finish(&mut self, phase: EnginePhase) {
        self.phase = phase;
        self.live = None;
        self.buffer.clear();
        self.flush_pending = false;
        info!(phase = ?phase, generated = self.generated.len(), "insertion finished");
    }

    fn leaf_kind(&self, text: &str) -> NodeKind {
        if self.mark_output {
            NodeKind::ai_generation(text)
        } else {
            NodeKind::text(text)
        }
    }

    fn write(&mut self, tx: &mut Transaction<'_>, text: &str) -> FlushOutcome {
        let mut outcome = FlushOutcome {
            written: text.chars().count(),
            ..Default::default()
        };

        let result = match self.live {
            None => self.place_first(tx, text, &mut outcome),
            Some(live) if self.is_writable(tx, live) => tx.append_text(live, text),
            Some(_) => self.recover(tx, text, &mut outcome),
        };

        if let Err(e) = result {
            warn!(error = %e, "insertion failed, re-anchoring at document end");
            match placement::append_paragraph(tx, self.leaf_kind(text)) {
                Ok((leaf, container)) => self.adopt(leaf, container, &mut outcome),
                Err(e) => {
                    warn!(error = %e, "could not re-anchor, chunk dropped");
                    outcome.written = 0;
                    return outcome;
                }
            }
        }

        if let Some(live) = self.live {
            let end = tx.text(live).map(|t| t.chars().count()).unwrap_or(0);
            tx.set_selection(Some(Selection::caret(live, end)));
        }
        outcome
    }

    fn place_first(
        &mut self,
        tx: &mut Transaction<'_>,
        text: &str,
        outcome: &mut FlushOutcome,
    ) -> Result<(), DocError> {
        let Placement {
            leaf,
            container,
            degraded,
        } = placement::place(tx, &self.strategy, self.leaf_kind(text))?;
        outcome.degraded = degraded;
        self.adopt(leaf, container, outcome);
        Ok(())
    }

    /// The live leaf was detached. Resume in the remembered container's last
    /// writable leaf, or re-anchor.
    fn recover(
        &mut self,
        tx: &mut Transaction<'_>,
        text: &str,
        outcome: &mut FlushOutcome,
    ) -> Result<(), DocError> {
        outcome.recovered = true;
        let container = self.container.filter(|c| tx.is_attached(*c));

        let Some(container) = container else {
            warn!(live = ?self.live, "live node and container gone, appending new paragraph");
            let (leaf, p) = placement::append_paragraph(tx, self.leaf_kind(text))?;
            self.adopt(leaf, p, outcome);
            return Ok(());
        };

        let resume = tx
            .text_leaves(container)
            .into_iter()
            .rev()
            .find(|k| self.is_writable(tx, *k));
        if let Some(leaf) = resume {
            debug!(from = ?self.live, to = %leaf, "live node recovered");
            self.live = Some(leaf);
            return tx.append_text(leaf, text);
        }

        let accepts = tx
            .kind(container)
            .is_some_and(|k| k.accepts_text() || matches!(k, NodeKind::ListItem));
        if accepts {
            let leaf = tx.create(self.leaf_kind(text));
            tx.append_child(container, leaf)?;
            self.adopt(leaf, container, outcome);
        } else {
            let (leaf, p) = placement::append_paragraph(tx, self.leaf_kind(text))?;
            self.adopt(leaf, p, outcome);
        }
        Ok(())
    }

    fn adopt(&mut self, leaf: NodeKey, container: NodeKey, outcome: &mut FlushOutcome) {
        self.live = Some(leaf);
        self.container = Some(container);
        if !self.generated.contains(&leaf) {
            self.generated.push(leaf);
        }
        outcome.created = Some(leaf);
    }

    /// Attached plain text or generation leaf. Tags and prompt markers are
    /// never written into.
    fn is_writable(&self, tx: &Transaction<'_>, key: NodeKey) -> bool {
        tx.is_attached(key)
            && matches!(
                tx.kind(key),
                Some(NodeKind::Text { .. } | NodeKind::AiGeneration(_))
            )
    }
}
