//! Size-bucketed cache of reusable offscreen surfaces.
//!
//! Buffered views render into pooled surfaces so a repaint of one view does
//! not force re-rasterizing the whole tree. The pool keeps idle surfaces in
//! five aspect-ratio buckets and accounts checked-out (`active`) and idle
//! (`cached`) bytes separately against a byte ceiling. Check-in may push the
//! total over the ceiling transiently; eviction immediately walks the
//! buckets round-robin, dropping the largest idle surface from each, until
//! the total is back under budget or no idle surface remains.

use crate::canvas::{HostWindow, PaintSurface};

const BUCKET_COUNT: usize = 5;

// Aspect buckets, computed from the width:height ratio.
const SQUARE: usize = 0; // 3:4 ..= 4:3
const WIDE: usize = 1; // 4:3 ..= 4:2
const NARROW: usize = 2; // 3:4 ..= 2:4
const VERY_WIDE: usize = 3; // wider than 4:2
const VERY_NARROW: usize = 4; // taller than 2:4

fn bucket_for(width: i32, height: i32) -> usize {
    let w = width as i64 * 12;
    let h = height as i64;
    if h * 9 <= w && w <= h * 16 {
        return SQUARE;
    }
    let h = h * 12;
    if w > h {
        if w / 2 <= h {
            WIDE
        } else {
            VERY_WIDE
        }
    } else if h / 2 <= w {
        NARROW
    } else {
        VERY_NARROW
    }
}

fn surface_bytes(s: &dyn PaintSurface) -> u64 {
    s.byte_size()
}

fn surface_area(s: &dyn PaintSurface) -> i64 {
    s.width() as i64 * s.height() as i64
}

/// Per-context surface cache with a byte budget.
pub struct BufferPool {
    buckets: [Vec<Box<dyn PaintSurface>>; BUCKET_COUNT],
    active_bytes: u64,
    cached_bytes: u64,
    limit_bytes: u64,
}

impl BufferPool {
    /// Default budget: 32 MiB of surface memory.
    pub const DEFAULT_LIMIT: u64 = 32 * 1024 * 1024;

    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }

    pub fn with_limit(limit_bytes: u64) -> Self {
        Self {
            buckets: Default::default(),
            active_bytes: 0,
            cached_bytes: 0,
            limit_bytes,
        }
    }

    /// Bytes currently checked out to views.
    pub fn active_bytes(&self) -> u64 {
        self.active_bytes
    }

    /// Bytes held idle in the buckets.
    pub fn cached_bytes(&self) -> u64 {
        self.cached_bytes
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Change the byte ceiling. Takes effect on the next check-in.
    pub fn set_limit_bytes(&mut self, limit_bytes: u64) {
        self.limit_bytes = limit_bytes;
    }

    /// Number of idle surfaces across all buckets.
    pub fn idle_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Check out a surface at least `width x height`, reusing the tightest
    /// idle fit when one exists.
    ///
    /// Zero or negative dimensions are rounded up to 1. A cached candidate
    /// is only reused when both dimensions are within 2x of the request;
    /// reusing an arbitrarily oversized surface would waste memory, so a
    /// fresh one is allocated instead.
    pub fn get_buffer(
        &mut self,
        host: &mut dyn HostWindow,
        width: i32,
        height: i32,
    ) -> Box<dyn PaintSurface> {
        let width = width.max(1);
        let height = height.max(1);
        match self.take_from_bucket(width, height) {
            Some(buf) => {
                let bytes = surface_bytes(&*buf);
                self.active_bytes += bytes;
                self.cached_bytes -= bytes;
                buf
            }
            None => {
                let buf = host.create_surface(width, height);
                // Account what the surface reports, not a guessed stride:
                // check-in subtracts `byte_size` and the two must agree.
                self.active_bytes += surface_bytes(&*buf);
                buf
            }
        }
    }

    /// Scan the matching bucket (sorted ascending by area) for the smallest
    /// surface that fits. The first candidate large enough decides: either
    /// it is within the 2x waste bound and is reused, or no cached surface
    /// is acceptable at all.
    fn take_from_bucket(&mut self, width: i32, height: i32) -> Option<Box<dyn PaintSurface>> {
        let bucket = &mut self.buckets[bucket_for(width, height)];
        for (i, buf) in bucket.iter().enumerate() {
            if buf.width() >= width && buf.height() >= height {
                if buf.width() <= width * 2 && buf.height() <= height * 2 {
                    return Some(bucket.remove(i));
                }
                return None;
            }
        }
        None
    }

    /// Return a surface to the pool, then evict until back under budget.
    pub fn turn_back_buffer(&mut self, buf: Box<dyn PaintSurface>) {
        let bytes = surface_bytes(&*buf);
        let area = surface_area(&*buf);
        let bucket = &mut self.buckets[bucket_for(buf.width(), buf.height())];
        let pos = bucket
            .iter()
            .position(|b| area <= surface_area(&**b))
            .unwrap_or(bucket.len());
        bucket.insert(pos, buf);
        self.active_bytes = self.active_bytes.saturating_sub(bytes);
        self.cached_bytes += bytes;
        self.enforce_limit();
    }

    /// Worst-fit-first eviction: drop the largest idle surface of each
    /// bucket in turn until the budget holds or nothing idle remains.
    fn enforce_limit(&mut self) {
        while self.cached_bytes > 0 && self.cached_bytes + self.active_bytes > self.limit_bytes {
            let mut evicted_any = false;
            for bucket in &mut self.buckets {
                if let Some(buf) = bucket.pop() {
                    let bytes = surface_bytes(&*buf);
                    self.cached_bytes = self.cached_bytes.saturating_sub(bytes);
                    log::debug!(
                        "evicting {}x{} surface ({} bytes) from buffer pool",
                        buf.width(),
                        buf.height(),
                        bytes
                    );
                    drop(buf);
                    evicted_any = true;
                    if self.cached_bytes + self.active_bytes <= self.limit_bytes {
                        return;
                    }
                }
            }
            if !evicted_any {
                return;
            }
        }
    }

    /// Release every idle surface unconditionally. Used on context teardown.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.cached_bytes = 0;
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
