//! Members of each shared layout identity.

use std::collections::HashMap;

use crate::geometry::LayoutBox;

use super::LayoutNodeId;

#[derive(Debug, Default)]
struct SharedEntry {
    /// Registration order; the last member is the lead.
    members: Vec<LayoutNodeId>,
    /// Box left behind by a member that went away before its successor
    /// registered.
    donated: Option<LayoutBox>,
}

#[derive(Debug, Default)]
pub(super) struct SharedStack {
    entries: HashMap<String, SharedEntry>,
}

impl SharedStack {
    /// Add a member, returning a box donated for it if one is waiting.
    pub fn add(&mut self, layout_id: &str, node: LayoutNodeId) -> Option<LayoutBox> {
        let entry = self.entries.entry(layout_id.to_string()).or_default();
        entry.members.push(node);
        entry.donated.take()
    }

    pub fn remove(&mut self, layout_id: &str, node: LayoutNodeId) {
        if let Some(entry) = self.entries.get_mut(layout_id) {
            entry.members.retain(|m| *m != node);
            if entry.members.is_empty() && entry.donated.is_none() {
                self.entries.remove(layout_id);
            }
        }
    }

    /// Most recently registered member other than `excluding` that passes
    /// `eligible`.
    pub fn lead(
        &self,
        layout_id: &str,
        excluding: LayoutNodeId,
        eligible: impl Fn(LayoutNodeId) -> bool,
    ) -> Option<LayoutNodeId> {
        self.entries.get(layout_id).and_then(|entry| {
            entry
                .members
                .iter()
                .rev()
                .copied()
                .find(|m| *m != excluding && eligible(*m))
        })
    }

    /// Keep `layout_box` for the next member to register.
    pub fn donate(&mut self, layout_id: &str, layout_box: LayoutBox) {
        self.entries.entry(layout_id.to_string()).or_default().donated = Some(layout_box);
    }

    /// Donations only bridge a single update window.
    pub fn clear_donations(&mut self) {
        self.entries.retain(|_, entry| {
            entry.donated = None;
            !entry.members.is_empty()
        });
    }

    pub fn members(&self, layout_id: &str) -> usize {
        self.entries.get(layout_id).map_or(0, |e| e.members.len())
    }
}
