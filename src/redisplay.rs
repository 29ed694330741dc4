// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Dirty-area bookkeeping for incremental redisplay.
//!
//! Each window keeps two pending lists. Areas on the redisplay list are
//! recomposed from the database; areas on the update list only need the
//! backing pixmap copied to screen. A depth counter guards against
//! reentry: requests made while a pass is running are queued and picked
//! up by the next pass of the same pump.

use crate::backend::PixRect;

/// Rectangles that never overlap: adding one that overlaps or touches
/// pending ones replaces them all with their union.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AreaList {
    rects: Vec<PixRect>,
}

impl AreaList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, r: PixRect) {
        let mut merged = r;
        loop {
            let before = self.rects.len();
            let touching = merged.bloat(1);
            self.rects.retain(|p| {
                if p.intersects(&touching) {
                    merged = merged.union(p);
                    false
                } else {
                    true
                }
            });
            if self.rects.len() == before {
                break;
            }
        }
        self.rects.push(merged);
    }

    /// Drop pending areas entirely inside `r`.
    pub fn remove_covered(&mut self, r: &PixRect) {
        self.rects
            .retain(|p| p.intersection(r).as_ref() != Some(p));
    }

    pub fn rects(&self) -> &[PixRect] {
        &self.rects
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn bounds(&self) -> Option<PixRect> {
        let mut it = self.rects.iter().copied();
        let first = it.next()?;
        Some(it.fold(first, |acc, r| acc.union(&r)))
    }

    pub fn take(&mut self) -> Vec<PixRect> {
        std::mem::take(&mut self.rects)
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

#[derive(Debug, Default, Clone)]
pub struct RedisplayController {
    depth: u32,
    redisplay: AreaList,
    update: AreaList,
    passes: usize,
}

impl RedisplayController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// True while a pass is running or the caller holds the guard.
    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn push(&mut self) {
        self.depth += 1;
    }

    /// Returns true when the outermost guard was released.
    pub fn pop(&mut self) -> bool {
        if self.depth == 0 {
            log::warn!("[REDISPLAY] unbalanced pop");
            return false;
        }
        self.depth -= 1;
        self.depth == 0
    }

    pub fn add_redisplay(&mut self, r: PixRect) {
        self.update.remove_covered(&r);
        self.redisplay.add(r);
    }

    /// Areas already queued for recomposition get the copy for free.
    pub fn add_update(&mut self, r: PixRect) {
        let covered = self
            .redisplay
            .rects()
            .iter()
            .any(|p| r.intersection(p) == Some(r));
        if !covered {
            self.update.add(r);
        }
    }

    pub fn pending(&self) -> &AreaList {
        &self.redisplay
    }

    pub fn pending_updates(&self) -> &AreaList {
        &self.update
    }

    pub fn has_work(&self) -> bool {
        !self.redisplay.is_empty() || !self.update.is_empty()
    }

    /// Start a pass if idle and there is something to recompose.
    pub fn begin_pass(&mut self) -> Option<Vec<PixRect>> {
        if self.depth > 0 || self.redisplay.is_empty() {
            return None;
        }
        self.depth += 1;
        Some(self.redisplay.take())
    }

    pub fn end_pass(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.passes += 1;
    }

    pub fn take_updates(&mut self) -> Vec<PixRect> {
        self.update.take()
    }

    /// Completed passes, for diagnostics.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn clear(&mut self) {
        self.redisplay.clear();
        self.update.clear();
    }
}
