//! Context assembly (spec.md §4.4): builds the system message C7 sends to
//! C6, folding in `planBlock` (the task checklist) and `knowledgeBlock`
//! (file-analysis summaries), without ever mutating the transcript.
//!
//! Grounded on `sa_contextpack::builder::ContextPackBuilder`'s
//! read-files-then-cap-then-format pipeline, repurposed: the teacher caps
//! raw workspace markdown files, this caps file-analysis summaries and a
//! task plan checklist instead.

use ac_domain::tool::{Message, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{ConversationStore, Key, ReservedKey};
use crate::truncation::{self, Section};

/// One entry of the `files` side-store key: a summary of a file the agent
/// inspected, not its raw bytes (the raw content doesn't belong in every
/// subsequent prompt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub filename: String,
    pub summary: String,
}

/// Caps applied when assembling `knowledgeBlock`. Mirrors the teacher's
/// `max_per_file` / `total_max` `ContextPackBuilder` fields.
#[derive(Debug, Clone, Copy)]
pub struct ContextCaps {
    pub max_per_file_chars: usize,
    pub total_max_chars: usize,
}

impl Default for ContextCaps {
    fn default() -> Self {
        Self {
            max_per_file_chars: 4_000,
            total_max_chars: 16_000,
        }
    }
}

impl ConversationStore {
    /// Assemble the message list C7 sends to C6: a system message
    /// (`system_prompt` + `planBlock` + `knowledgeBlock`) followed by the
    /// transcript. Both blocks are empty strings when there's nothing to
    /// show, and neither is appended to the transcript itself.
    pub fn build_context(&self, system_prompt: &str, caps: ContextCaps) -> Vec<Message> {
        let plan_block = self.render_plan_block();
        let knowledge_block = self.render_knowledge_block(caps);

        let mut combined = system_prompt.to_string();
        if !plan_block.is_empty() {
            combined.push_str("\n\n");
            combined.push_str(&plan_block);
        }
        if !knowledge_block.is_empty() {
            combined.push_str("\n\n");
            combined.push_str(&knowledge_block);
        }

        let mut messages = vec![Message::system(combined)];
        messages.extend(self.history());
        messages
    }

    fn render_plan_block(&self) -> String {
        let todo = match self.get(&Key::reserved(ReservedKey::Todo)) {
            Some(v) => v,
            None => return String::new(),
        };
        let tasks: Vec<Task> = match serde_json::from_value(todo) {
            Ok(t) => t,
            Err(_) => return String::new(),
        };
        if tasks.is_empty() {
            return String::new();
        }

        let mut block = String::from("=== TASK_PLAN ===\n");
        for task in &tasks {
            let mark = match task.status {
                TaskStatus::Pending => "[ ]",
                TaskStatus::Done => "[x]",
                TaskStatus::Failed => "[!]",
            };
            block.push_str(&format!("{mark} {}\n", task.description));
        }
        block.push_str("=== END_TASK_PLAN ===");
        block
    }

    fn render_knowledge_block(&self, caps: ContextCaps) -> String {
        let files = match self.get(&Key::reserved(ReservedKey::Files)) {
            Some(v) => v,
            None => return String::new(),
        };
        let analyses: Vec<FileAnalysis> = match parse_file_analyses(&files) {
            Some(a) if !a.is_empty() => a,
            _ => return String::new(),
        };

        let mut sections: Vec<Section> = analyses
            .iter()
            .map(|a| {
                let (content, truncated) = truncation::truncate_per_file(&a.summary, caps.max_per_file_chars);
                Section {
                    name: a.filename.clone(),
                    raw_chars: a.summary.len(),
                    content,
                    truncated_per_file: truncated,
                    truncated_total_cap: false,
                    included: true,
                }
            })
            .collect();
        truncation::apply_total_cap(&mut sections, caps.total_max_chars);

        let mut block = String::from("=== KNOWLEDGE ===\n");
        for section in &sections {
            if !section.included || section.content.is_empty() {
                continue;
            }
            block.push_str(&format!(
                "--- {} (raw {} chars) ---\n{}\n",
                section.name, section.raw_chars, section.content
            ));
        }
        block.push_str("=== END_KNOWLEDGE ===");
        block
    }
}

fn parse_file_analyses(v: &Value) -> Option<Vec<FileAnalysis>> {
    serde_json::from_value(v.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_produces_plain_system_prompt() {
        let store = ConversationStore::new();
        let ctx = store.build_context("You are helpful.", ContextCaps::default());
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0].content.text(), Some("You are helpful."));
    }

    #[test]
    fn plan_block_renders_checklist_and_is_not_appended_to_transcript() {
        let store = ConversationStore::new();
        let mut task = Task::new(1, "write tests");
        task.mark_done();
        store.set(&Key::reserved(ReservedKey::Todo), serde_json::to_value(vec![task]).unwrap());

        let ctx = store.build_context("sys", ContextCaps::default());
        let system_text = ctx[0].content.text().unwrap();
        assert!(system_text.contains("[x] write tests"));
        assert!(store.history().is_empty());
    }

    #[test]
    fn knowledge_block_summarizes_file_analyses() {
        let store = ConversationStore::new();
        let analyses = vec![FileAnalysis {
            filename: "notes.md".into(),
            summary: "three open questions remain".into(),
        }];
        store.set(&Key::reserved(ReservedKey::Files), serde_json::to_value(analyses).unwrap());

        let ctx = store.build_context("sys", ContextCaps::default());
        let system_text = ctx[0].content.text().unwrap();
        assert!(system_text.contains("notes.md"));
        assert!(system_text.contains("three open questions remain"));
    }
}
