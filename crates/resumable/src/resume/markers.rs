use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ResumeError;

use super::boundary::ServerOutcome;

/// Boundary markers found in a streamed document.
#[derive(Debug, Default)]
pub struct DocumentMarkers {
    inline: Vec<String>,
    pending: FxHashMap<String, u32>,
    completed: FxHashSet<u32>,
    errored: FxHashSet<u32>,
}

impl DocumentMarkers {
    pub fn parse(document: &str) -> Result<Self, ResumeError> {
        let inline_regex = Regex::new(r"<!--\$:([A-Za-z0-9_-]+)-->")?;
        let pending_regex =
            Regex::new(r#"<!--\$\?:([A-Za-z0-9_-]+)--><template id="B:(\d+)"></template>"#)?;
        let settle_regex = Regex::new(r#"<script>\$R([CX])\("B:(\d+)""#)?;

        let mut markers = Self::default();

        for captures in inline_regex.captures_iter(document) {
            markers.inline.push(captures[1].to_string());
        }

        for captures in pending_regex.captures_iter(document) {
            let segment = parse_segment(&captures[2])?;
            markers.pending.insert(captures[1].to_string(), segment);
        }

        for captures in settle_regex.captures_iter(document) {
            let segment = parse_segment(&captures[2])?;
            if &captures[1] == "C" {
                markers.completed.insert(segment);
            } else {
                markers.errored.insert(segment);
            }
        }

        Ok(markers)
    }

    /// `None` when the document carries no marker for `boundary_id`.
    pub fn outcome(&self, boundary_id: &str) -> Option<ServerOutcome> {
        if self.inline.iter().any(|id| id == boundary_id) {
            return Some(ServerOutcome::Content);
        }

        let segment = self.pending.get(boundary_id)?;
        if self.completed.contains(segment) && !self.errored.contains(segment) {
            Some(ServerOutcome::Content)
        } else {
            Some(ServerOutcome::Fallback)
        }
    }

    pub fn boundary_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.inline.iter().map(String::as_str).collect();
        ids.extend(self.pending.keys().map(String::as_str));
        ids.sort_unstable();
        ids
    }
}

fn parse_segment(raw: &str) -> Result<u32, ResumeError> {
    raw.parse().map_err(|_| ResumeError::serialization(format!("Invalid segment number '{raw}'")))
}
