//! Bounded evidence ring of reassembled stream segments.
//!
//! Each direction of a connection keeps the most recent contiguous segments
//! it produced. The ring is not sorted; insertion order is the logical
//! order, and because only contiguous segments are written, consecutive
//! cells cover adjacent sequence ranges. That ordering is the evidence the
//! injection detector compares new segments against.

use std::collections::VecDeque;

use crate::core::sequence::Sequence;

/// A contiguous payload fragment as it was observed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembly {
    pub seq: Sequence,
    pub bytes: Vec<u8>,
}

impl Reassembly {
    /// Sequence number of the last byte in this segment.
    fn last(&self) -> Sequence {
        self.seq.add(self.bytes.len() as i32 - 1)
    }

    /// Whether `s` falls inside [seq, last].
    fn contains(&self, s: Sequence) -> bool {
        self.seq.diff(s) >= 0 && s.diff(self.last()) >= 0
    }

    /// Whether [start, end] intersects [seq, last].
    fn intersects(&self, start: Sequence, end: Sequence) -> bool {
        self.seq.diff(end) >= 0 && start.diff(self.last()) >= 0
    }
}

/// Previously-observed bytes covering a sub-range of a new segment.
///
/// `bytes.len()` always equals `end_offset - start_offset`; the offsets
/// select the sub-slice of the new packet's payload that the bytes
/// correspond to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapBytes {
    pub bytes: Vec<u8>,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Fixed-capacity ring of the most recent reassembled segments.
#[derive(Debug)]
pub struct SegmentRing {
    cells: VecDeque<Reassembly>,
    capacity: usize,
}

impl SegmentRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a segment, overwriting the oldest cell when full.
    ///
    /// Callers only push segments that were contiguous at insertion time;
    /// the extraction logic relies on adjacent cells covering adjacent
    /// sequence ranges.
    pub fn push(&mut self, seq: Sequence, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        if self.cells.len() == self.capacity {
            self.cells.pop_front();
        }
        self.cells.push_back(Reassembly { seq, bytes });
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Segments in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reassembly> {
        self.cells.iter()
    }

    /// Indices of the first and last cells overlapping [start, end].
    ///
    /// The head is the cell containing `start`, or the oldest intersecting
    /// cell when `start` precedes everything still in the ring. `None` when
    /// no cell intersects the range at all.
    fn overlap_span(&self, start: Sequence, end: Sequence) -> Option<(usize, usize)> {
        let head = self
            .cells
            .iter()
            .position(|c| c.contains(start))
            .or_else(|| self.cells.iter().position(|c| c.intersects(start, end)))?;

        let mut tail = head;
        for i in head + 1..self.cells.len() {
            if self.cells[i].intersects(start, end) {
                tail = i;
            } else {
                break;
            }
        }
        Some((head, tail))
    }

    /// Extract the bytes previously seen for the overlap with [start, end],
    /// along with the slice offsets into the querying packet's payload.
    ///
    /// Returns `None` when the ring holds no data for the range.
    pub fn extract_overlap(&self, start: Sequence, end: Sequence) -> Option<OverlapBytes> {
        if start.diff(end) < 0 {
            return None;
        }
        let (head, tail) = self.overlap_span(start, end)?;

        // Clamp the query to what the ring actually holds.
        let head_cell = &self.cells[head];
        let tail_cell = &self.cells[tail];
        let overlap_start = if head_cell.contains(start) {
            start
        } else {
            head_cell.seq
        };
        let overlap_end = if tail_cell.contains(end) {
            end
        } else {
            tail_cell.last()
        };

        let start_offset = start.diff(overlap_start) as usize;
        let end_offset = (start.diff(overlap_end) + 1) as usize;

        let mut bytes = Vec::with_capacity(end_offset - start_offset);
        for i in head..=tail {
            let cell = &self.cells[i];
            let from = if i == head {
                cell.seq.diff(overlap_start) as usize
            } else {
                0
            };
            let to = if i == tail {
                (cell.seq.diff(overlap_end) + 1) as usize
            } else {
                cell.bytes.len()
            };
            bytes.extend_from_slice(&cell.bytes[from..to]);
        }

        Some(OverlapBytes {
            bytes,
            start_offset,
            end_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(segments: &[(u32, &[u8])]) -> SegmentRing {
        let mut ring = SegmentRing::new(40);
        for &(seq, bytes) in segments {
            ring.push(Sequence(seq), bytes.to_vec());
        }
        ring
    }

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut ring = SegmentRing::new(3);
        for i in 0..5u32 {
            ring.push(Sequence(100 + i), vec![i as u8]);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().next().unwrap().seq, Sequence(102));
    }

    #[test]
    fn test_push_ignores_empty_payload() {
        let mut ring = SegmentRing::new(4);
        ring.push(Sequence(100), Vec::new());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_exact_single_cell_overlap() {
        let ring = ring_with(&[(101, b"HELLO")]);
        let overlap = ring
            .extract_overlap(Sequence(101), Sequence(105))
            .unwrap();
        assert_eq!(overlap.bytes, b"HELLO");
        assert_eq!(overlap.start_offset, 0);
        assert_eq!(overlap.end_offset, 5);
    }

    #[test]
    fn test_sub_range_of_single_cell() {
        let ring = ring_with(&[(101, b"HELLO")]);
        let overlap = ring
            .extract_overlap(Sequence(102), Sequence(103))
            .unwrap();
        assert_eq!(overlap.bytes, b"EL");
        assert_eq!(overlap.start_offset, 0);
        assert_eq!(overlap.end_offset, 2);
    }

    #[test]
    fn test_overlap_spanning_two_cells() {
        // "AB" at 101, "CD" at 103; query [102, 103] covers "B" and "C".
        let ring = ring_with(&[(101, b"AB"), (103, b"CD")]);
        let overlap = ring
            .extract_overlap(Sequence(102), Sequence(103))
            .unwrap();
        assert_eq!(overlap.bytes, b"BC");
        assert_eq!(overlap.start_offset, 0);
        assert_eq!(overlap.end_offset, 2);
    }

    #[test]
    fn test_overlap_spanning_three_cells() {
        let ring = ring_with(&[(100, b"aaaa"), (104, b"bbbb"), (108, b"cccc")]);
        let overlap = ring
            .extract_overlap(Sequence(102), Sequence(109))
            .unwrap();
        assert_eq!(overlap.bytes, b"aabbbbcc");
        assert_eq!(overlap.start_offset, 0);
        assert_eq!(overlap.end_offset, 8);
    }

    #[test]
    fn test_query_past_newest_is_clamped() {
        // Ring only holds up to 105; the tail of the query has no evidence.
        let ring = ring_with(&[(101, b"HELLO")]);
        let overlap = ring
            .extract_overlap(Sequence(103), Sequence(112))
            .unwrap();
        assert_eq!(overlap.bytes, b"LLO");
        assert_eq!(overlap.start_offset, 0);
        assert_eq!(overlap.end_offset, 3);
    }

    #[test]
    fn test_query_before_oldest_is_clamped() {
        // Bytes before 101 were evicted; offsets skip the missing prefix.
        let ring = ring_with(&[(101, b"HELLO")]);
        let overlap = ring
            .extract_overlap(Sequence(98), Sequence(103))
            .unwrap();
        assert_eq!(overlap.bytes, b"HEL");
        assert_eq!(overlap.start_offset, 3);
        assert_eq!(overlap.end_offset, 6);
    }

    #[test]
    fn test_disjoint_query_yields_none() {
        let ring = ring_with(&[(101, b"HELLO")]);
        assert!(ring.extract_overlap(Sequence(500), Sequence(510)).is_none());
        assert!(ring.extract_overlap(Sequence(50), Sequence(60)).is_none());
    }

    #[test]
    fn test_empty_ring_yields_none() {
        let ring = SegmentRing::new(4);
        assert!(ring.extract_overlap(Sequence(101), Sequence(105)).is_none());
    }

    #[test]
    fn test_overlap_length_matches_offsets() {
        let ring = ring_with(&[(1000, b"0123456789")]);
        for (s, e) in [(995, 1002), (1003, 1020), (1000, 1009)] {
            let overlap = ring.extract_overlap(Sequence(s), Sequence(e)).unwrap();
            assert_eq!(overlap.bytes.len(), overlap.end_offset - overlap.start_offset);
        }
    }

    #[test]
    fn test_overlap_across_sequence_wrap() {
        let ring = ring_with(&[(u32::MAX - 1, b"WXYZ")]);
        // Segment covers MAX-1, MAX, 0, 1; query [MAX, 0].
        let overlap = ring
            .extract_overlap(Sequence(u32::MAX), Sequence(0))
            .unwrap();
        assert_eq!(overlap.bytes, b"XY");
        assert_eq!(overlap.start_offset, 0);
        assert_eq!(overlap.end_offset, 2);
    }
}
