//! Batch bookkeeping.
//!
//! Batches wrap bursts of related messages between `BATCH +<label>` and
//! `BATCH -<label>` frames; intermediate lines carry a `batch=<label>` tag.
//! The opening frame is sent lazily, only to destinations that actually
//! receive a wrapped line, and every opened frame is closed exactly once.

use crate::conn::ConnId;
use crate::state::entity::EntityId;
use crate::state::network::Network;
use rand::Rng;
use std::collections::HashSet;
use weft_proto::Tag;

/// One active batch.
#[derive(Debug, Clone)]
pub struct Batch {
    pub label: String,
    /// Batch type, e.g. `netjoin` or `netsplit`.
    pub btype: String,
    pub args: Vec<String>,
    /// Entity whose lifecycle bounds this batch.
    pub started_by: EntityId,
    /// Connections that saw the opening frame and must see the close.
    pub announced: HashSet<ConnId>,
}

/// A fresh random batch label.
pub fn new_label() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

impl Network {
    /// Open a batch bound to `started_by`.
    pub fn start_batch(&mut self, started_by: &str, btype: &str, args: &[&str]) -> String {
        let label = new_label();
        self.batches.push(Batch {
            label: label.clone(),
            btype: btype.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            started_by: started_by.to_string(),
            announced: HashSet::new(),
        });
        label
    }

    /// The running batch of a given type started by an entity, if any.
    pub fn find_batch(&self, started_by: &str, btype: &str) -> Option<String> {
        self.batches
            .iter()
            .find(|b| b.started_by == started_by && b.btype == btype)
            .map(|b| b.label.clone())
    }

    /// Prepare the `batch` tag for a line about to be delivered to `conn`.
    ///
    /// Announces the opening frame to that connection first when needed.
    /// Returns `None` when the destination did not negotiate `batch`.
    pub fn batch_tag_for(&mut self, label: &str, conn: ConnId) -> Option<Tag> {
        let has_cap = self
            .conns
            .get(&conn)
            .is_some_and(|c| c.caps.contains("batch"));
        if !has_cap {
            return None;
        }
        let idx = self.batches.iter().position(|b| b.label == label)?;
        if self.batches[idx].announced.insert(conn) {
            let open = format!(
                ":{} BATCH +{} {}",
                self.me_name(),
                label,
                std::iter::once(self.batches[idx].btype.clone())
                    .chain(self.batches[idx].args.iter().cloned())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
            self.send_raw_to_conn(conn, &open);
        }
        Some(Tag::new("batch", Some(label)))
    }

    /// Close a batch, sending the closing frame to every announced
    /// destination.
    pub fn end_batch(&mut self, label: &str) {
        let Some(idx) = self.batches.iter().position(|b| b.label == label) else {
            return;
        };
        let batch = self.batches.remove(idx);
        let close = format!(":{} BATCH -{}", self.me_name(), batch.label);
        for conn in batch.announced {
            self.send_raw_to_conn(conn, &close);
        }
    }

    /// Close every batch bounded by an exiting entity.
    pub fn end_batches_of(&mut self, entity: &str) {
        let labels: Vec<String> = self
            .batches
            .iter()
            .filter(|b| b.started_by == entity)
            .map(|b| b.label.clone())
            .collect();
        for label in labels {
            self.end_batch(&label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_distinct_and_printable() {
        let a = new_label();
        let b = new_label();
        assert_eq!(a.len(), 10);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
