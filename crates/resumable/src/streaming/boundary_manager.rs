use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BoundaryRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub segment: Option<u32>,
    pub placeholder_rendered: bool,
    pub is_resolved: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundaryCounts {
    pub registered: usize,
    pub pending: usize,
    pub resolved: usize,
    pub errored: usize,
}

/// Bookkeeping for the boundaries seen during one render pass.
#[derive(Debug, Default)]
pub struct SuspenseBoundaryManager {
    boundaries: Mutex<FxHashMap<String, BoundaryRecord>>,
    rendered_placeholder_ids: Mutex<FxHashSet<String>>,
}

impl SuspenseBoundaryManager {
    pub fn new() -> Self {
        Self {
            boundaries: Mutex::new(FxHashMap::default()),
            rendered_placeholder_ids: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn register_boundary(&self, id: &str, parent_id: Option<&str>) {
        let mut boundaries = self.boundaries.lock();

        if boundaries.contains_key(id) {
            tracing::warn!(
                "Duplicate boundary registration detected: boundary_id='{}'. This may cause duplicate placeholders.",
                id
            );
        }

        boundaries.insert(
            id.to_string(),
            BoundaryRecord {
                id: id.to_string(),
                parent_id: parent_id.map(str::to_string),
                segment: None,
                placeholder_rendered: false,
                is_resolved: false,
                error: None,
            },
        );
    }

    /// Records that the placeholder for `id` went into the stream under
    /// `segment`. Returns `false` if one was already emitted.
    pub fn mark_placeholder_rendered(&self, id: &str, segment: u32) -> bool {
        let is_first = self.rendered_placeholder_ids.lock().insert(id.to_string());

        if !is_first {
            tracing::warn!(
                "Duplicate placeholder detected for boundary '{}'. Only one placeholder should be rendered per boundary.",
                id
            );
        }

        if let Some(boundary) = self.boundaries.lock().get_mut(id) {
            boundary.placeholder_rendered = true;
            boundary.segment = Some(segment);
        }

        is_first
    }

    pub fn resolve_boundary(&self, id: &str) {
        let mut boundaries = self.boundaries.lock();

        if let Some(boundary) = boundaries.get_mut(id) {
            if boundary.is_resolved {
                tracing::warn!("Boundary '{}' is already resolved", id);
            }
            boundary.is_resolved = true;
        }
    }

    pub fn fail_boundary(&self, id: &str, message: &str) {
        if let Some(boundary) = self.boundaries.lock().get_mut(id) {
            boundary.error = Some(message.to_string());
        }
    }

    /// Drops a boundary whose enclosing content was never emitted.
    pub fn discard_boundary(&self, id: &str) {
        self.boundaries.lock().remove(id);
        self.rendered_placeholder_ids.lock().remove(id);
    }

    pub fn record(&self, id: &str) -> Option<BoundaryRecord> {
        self.boundaries.lock().get(id).cloned()
    }

    pub fn pending_boundaries(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .boundaries
            .lock()
            .values()
            .filter(|b| !b.is_resolved && b.error.is_none())
            .map(|b| b.id.clone())
            .collect();
        pending.sort();
        pending
    }

    pub fn errored_boundaries(&self) -> Vec<String> {
        let mut errored: Vec<String> = self
            .boundaries
            .lock()
            .values()
            .filter(|b| b.error.is_some())
            .map(|b| b.id.clone())
            .collect();
        errored.sort();
        errored
    }

    pub fn counts(&self) -> BoundaryCounts {
        let boundaries = self.boundaries.lock();

        let mut counts = BoundaryCounts { registered: boundaries.len(), ..BoundaryCounts::default() };
        for boundary in boundaries.values() {
            if boundary.error.is_some() {
                counts.errored += 1;
            } else if boundary.is_resolved {
                counts.resolved += 1;
            } else {
                counts.pending += 1;
            }
        }

        counts
    }

    /// Boundaries flagged as having a placeholder that the placeholder set
    /// does not know about.
    pub fn validate_no_duplicate_placeholders(&self) -> Vec<String> {
        let boundaries = self.boundaries.lock();
        let placeholder_ids = self.rendered_placeholder_ids.lock();

        let mut inconsistent = Vec::new();

        for (id, boundary) in boundaries.iter() {
            if boundary.placeholder_rendered && !placeholder_ids.contains(id) {
                tracing::warn!(
                    "Inconsistency detected: boundary '{}' has placeholder_rendered=true but is not in rendered_placeholder_ids",
                    id
                );
                inconsistent.push(id.clone());
            }
        }

        if !inconsistent.is_empty() {
            tracing::error!(
                "Placeholder validation failed: {} boundaries have inconsistent state",
                inconsistent.len()
            );
        }

        inconsistent
    }

    pub fn rendered_placeholder_count(&self) -> usize {
        self.rendered_placeholder_ids.lock().len()
    }
}
