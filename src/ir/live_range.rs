// This module implements the LiveRange container used as the unit of
// liveness data attached to every Variable, together with the RegWeight
// wrapper consumed by the register allocator. A LiveRange is an ordered list
// of disjoint, non-adjacent half-open segments over the instruction-number
// space. Generally there is one segment per basic block where the variable
// is live, but touching or overlapping segments are coalesced on insertion
// so the list stays maximally merged. The range also accumulates a single
// weight so that, for example, a variable mentioned inside a hot block can
// be preferred during register assignment. TrimmedBegin-style trimming is
// provided for the linear-scan consumer: as allocation advances
// monotonically by range start, segments that ended before the current
// position can be skipped by all overlap queries.

//! Live ranges and register-allocation weights.

use std::fmt;

/// Instruction number used as the ordering key of the live-range space.
///
/// Numbers are not necessarily contiguous. Negative and small values are
/// reserved as sentinels, see [`Inst`](crate::ir::Inst).
pub type InstNumber = i32;

/// A `u32` weight with a sticky infinity, used to bias register allocation.
///
/// Adding anything to infinity leaves it infinite, and adding infinity to
/// any weight makes it infinite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegWeight(u32);

impl RegWeight {
    /// Forces the register allocator to give a register.
    pub const INF: RegWeight = RegWeight(u32::MAX);
    /// Forces the register allocator NOT to give a register.
    pub const ZERO: RegWeight = RegWeight(0);

    pub fn new(weight: u32) -> Self {
        RegWeight(weight)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_inf(self) -> bool {
        self.0 == u32::MAX
    }

    /// Saturating accumulate: `w + INF = INF`.
    pub fn add(&mut self, delta: RegWeight) {
        if delta.is_inf() {
            *self = RegWeight::INF;
        } else if !self.is_inf() {
            self.0 = self.0.saturating_add(delta.0);
        }
    }
}

impl fmt::Display for RegWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inf() {
            write!(f, "inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A set of instruction-number intervals representing a variable's live
/// range, plus an accumulated allocation weight.
///
/// Segments are half-open `[start, end)`, kept sorted and maximally merged:
/// after any operation no two stored segments overlap or touch.
#[derive(Debug, Clone, Default)]
pub struct LiveRange {
    segments: Vec<(InstNumber, InstNumber)>,
    weight: RegWeight,
    /// Index of the first segment still relevant to the linear-scan
    /// consumer, see [`LiveRange::trim`].
    trimmed_begin: usize,
}

impl LiveRange {
    pub fn new() -> Self {
        LiveRange::default()
    }

    /// Drops all segments, zeroes the weight and untrims.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.weight = RegWeight::ZERO;
        self.untrim();
    }

    /// Inserts `[start, end)`, merging with any segment it overlaps or
    /// touches so the invariant of disjoint, non-adjacent segments holds.
    pub fn add_segment(&mut self, start: InstNumber, end: InstNumber) {
        debug_assert!(start <= end);
        // First segment whose end reaches `start`; everything before it is
        // strictly to the left and untouched.
        let lo = self.segments.partition_point(|&(_, e)| e < start);
        // All segments beginning at or before `end` merge with the new one.
        let mut hi = lo;
        let mut merged = (start, end);
        while hi < self.segments.len() && self.segments[hi].0 <= end {
            merged.0 = merged.0.min(self.segments[hi].0);
            merged.1 = merged.1.max(self.segments[hi].1);
            hi += 1;
        }
        if lo == hi {
            self.segments.insert(lo, merged);
        } else {
            self.segments[lo] = merged;
            self.segments.drain(lo + 1..hi);
        }
        self.trimmed_begin = 0;
    }

    /// Whether the point `value` is covered.
    ///
    /// Reads are end-inclusive: a use at the exact end of a segment is the
    /// use that ends the range and is still covered. Writes are
    /// end-exclusive, so a definition immediately after a segment ends is a
    /// fresh definition and not a redefinition of live data.
    pub fn contains_value(&self, value: InstNumber, is_dest: bool) -> bool {
        self.segments
            .iter()
            .any(|&(s, e)| s <= value && (value < e || (!is_dest && value == e)))
    }

    /// Whether the two ranges share any instruction number.
    pub fn overlaps(&self, other: &LiveRange, use_trimmed: bool) -> bool {
        let mut i = if use_trimmed { self.trimmed_begin } else { 0 };
        let mut j = if use_trimmed { other.trimmed_begin } else { 0 };
        while i < self.segments.len() && j < other.segments.len() {
            let (s1, e1) = self.segments[i];
            let (s2, e2) = other.segments[j];
            if s1 < e2 && s2 < e1 {
                return true;
            }
            if e1 <= e2 {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }

    /// Whether the range covers the single instruction number `other_begin`
    /// (exclusive of segment ends). Used by linear scan to test a candidate
    /// range start against ranges already allocated.
    pub fn overlaps_start(&self, other_begin: InstNumber, use_trimmed: bool) -> bool {
        let start = if use_trimmed { self.trimmed_begin } else { 0 };
        for &(s, e) in &self.segments[start..] {
            if other_begin < s {
                break;
            }
            if other_begin < e {
                return true;
            }
        }
        false
    }

    /// Whether this range ends at or before the first point of `other`.
    /// Empty ranges compare as ending before everything.
    pub fn ends_before(&self, other: &LiveRange) -> bool {
        match (self.segments.last(), other.segments.first()) {
            (Some(&(_, e)), Some(&(s, _))) => e <= s,
            _ => true,
        }
    }

    /// Skips segments ending at or before `lower` in subsequent trimmed
    /// overlap queries. The linear-scan consumer calls this as its current
    /// position advances; [`LiveRange::untrim`] resets the state.
    pub fn trim(&mut self, lower: InstNumber) {
        while self.trimmed_begin < self.segments.len()
            && self.segments[self.trimmed_begin].1 <= lower
        {
            self.trimmed_begin += 1;
        }
    }

    pub fn untrim(&mut self) {
        self.trimmed_begin = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First covered instruction number, or `None` for an empty range.
    pub fn start(&self) -> Option<InstNumber> {
        self.segments.first().map(|&(s, _)| s)
    }

    pub fn segments(&self) -> &[(InstNumber, InstNumber)] {
        &self.segments
    }

    pub fn weight(&self) -> RegWeight {
        self.weight
    }

    pub fn set_weight(&mut self, weight: RegWeight) {
        self.weight = weight;
    }

    pub fn add_weight(&mut self, delta: RegWeight) {
        self.weight.add(delta);
    }
}

impl fmt::Display for LiveRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(weight={}) ", self.weight)?;
        for (i, &(s, e)) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}:{})", s, e)?;
        }
        Ok(())
    }
}
