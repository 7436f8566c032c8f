//! Plain-text serialization.

use modelpad_types::NodeKey;

use crate::tree::DocumentTree;

const BLOCK_SEPARATOR: &str = "\n\n";

impl DocumentTree {
    /// Plain text of a subtree.
    ///
    /// Leaves contribute their text. Inside an element, inline children
    /// concatenate and each block child except the last is followed by a
    /// blank line. Stale keys yield an empty string.
    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.write_text(key, &mut out);
        out
    }

    /// Plain text of the whole document.
    pub fn plain_text(&self) -> String {
        self.text_content(self.root)
    }

    fn write_text(&self, key: NodeKey, out: &mut String) {
        let Some(kind) = self.kind(key) else {
            return;
        };
        if let Some(text) = kind.text_content() {
            out.push_str(text);
            return;
        }
        let children = self.children(key);
        for (i, child) in children.iter().enumerate() {
            self.write_text(*child, out);
            let is_block = self
                .kind(*child)
                .is_some_and(|k| k.is_element() && !k.is_inline());
            if is_block && i + 1 < children.len() {
                out.push_str(BLOCK_SEPARATOR);
            }
        }
    }
}
