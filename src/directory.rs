//! In-memory chunk directory: logical-to-physical chunk index.
//!
//! Entries are kept in the order the producer appended them; they are not
//! sorted by logical start and several entries may cover the same logical
//! range when the producer overwrote data. Append order is authoritative
//! for overwrite resolution: the latest entry covering a position owns it.
//!
//! Built once per reader, immutable afterwards, safe to share across
//! cursor clones.

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::FrameHeader;
use crate::input::{RawInput, SliceInput};

/// Directories smaller than this resolve lookups by linear scan; larger
/// ones binary-search a start-sorted index first.
const LINEAR_SCAN_LIMIT: usize = 100;

/// One physical chunk: where its payload lives in the raw file and which
/// logical range it decompresses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    pub logical_start: u64,
    pub physical_start: u64,
    pub logical_len: u64,
}

impl ChunkRecord {
    pub fn logical_end(&self) -> u64 {
        self.logical_start + self.logical_len
    }

    pub fn covers(&self, pos: u64) -> bool {
        self.logical_start <= pos && pos < self.logical_end()
    }
}

pub struct ChunkDirectory {
    records: Vec<ChunkRecord>,
    /// `(logical_start, append index)`, sorted; append index breaks ties so
    /// later writes stay ordered after earlier ones.
    by_logical_start: Vec<(u64, usize)>,
    total_logical_len: u64,
    max_logical_len: u64,
    max_physical_read: u64,
    directory_start: u64,
}

impl ChunkDirectory {
    fn from_records(records: Vec<ChunkRecord>, total_logical_len: u64, directory_start: u64) -> Self {
        let mut by_logical_start: Vec<(u64, usize)> = records
            .iter()
            .enumerate()
            .map(|(idx, rec)| (rec.logical_start, idx))
            .collect();
        by_logical_start.sort_unstable();

        let max_logical_len = records.iter().map(|rec| rec.logical_len).max().unwrap_or(0);

        let mut max_physical_read = 0u64;
        let mut last_physical = records.first().map_or(0, |rec| rec.physical_start);
        for rec in records.iter().skip(1) {
            max_physical_read = max_physical_read.max(rec.physical_start.saturating_sub(last_physical));
            last_physical = rec.physical_start;
        }
        max_physical_read = max_physical_read.max(directory_start.saturating_sub(last_physical));

        Self {
            records,
            by_logical_start,
            total_logical_len,
            max_logical_len,
            max_physical_read,
            directory_start,
        }
    }

    /// Parses the decompressed directory payload: entry count, then
    /// `(logical_start, physical_start, logical_len)` per entry. Any entry
    /// breaking the stream bounds rejects the whole directory so the caller
    /// can fall back to a scan.
    pub(crate) fn parse_payload(
        payload: &[u8],
        total_logical_len: u64,
        directory_start: u64,
    ) -> Result<Self> {
        let mut input = SliceInput::new(payload);
        let count = input.read_var_u64()?;
        // each entry takes at least three varint bytes
        if count.saturating_mul(3) > payload.len() as u64 {
            return Err(Error::DirectoryCorrupt(format!(
                "entry count {count} exceeds payload of {} bytes",
                payload.len()
            )));
        }

        let mut records = Vec::with_capacity(count as usize);
        for i in 0..count {
            let logical_start = input.read_var_u64()?;
            let physical_start = input.read_var_u64()?;
            let logical_len = input.read_var_u64()?;
            let valid = logical_start <= total_logical_len
                && logical_start
                    .checked_add(logical_len)
                    .is_some_and(|end| end <= total_logical_len);
            if !valid {
                return Err(Error::DirectoryCorrupt(format!(
                    "entry {i} [{logical_start}, +{logical_len}) outside stream of length {total_logical_len}"
                )));
            }
            records.push(ChunkRecord {
                logical_start,
                physical_start,
                logical_len,
            });
        }
        Ok(Self::from_records(records, total_logical_len, directory_start))
    }

    /// Rebuilds the directory by walking chunk frames from the first body
    /// byte to end of file. Used when the trailer is missing or rejected;
    /// CRCs are not verified here. The logical length is accumulated from
    /// frame headers, so files with overwrites come out overlong; reads of
    /// the real data are unaffected.
    pub(crate) fn scan(input: &mut dyn RawInput, body_start: u64) -> Result<Self> {
        let file_len = input.len();
        input.seek(body_start)?;

        let mut records = Vec::new();
        let mut total_logical_len = 0u64;
        while input.tell() < file_len {
            let physical_start = input.tell();
            let header = FrameHeader::read_from(input).map_err(|err| {
                Error::DirectoryCorrupt(format!(
                    "unparseable chunk frame at physical offset {physical_start}: {err}"
                ))
            })?;
            records.push(ChunkRecord {
                logical_start: header.logical_start,
                physical_start,
                logical_len: header.logical_len,
            });
            total_logical_len += header.logical_len;

            let next = input.tell().checked_add(header.compressed_len).ok_or_else(|| {
                Error::DirectoryCorrupt(format!(
                    "chunk frame at {physical_start} overflows file offsets"
                ))
            })?;
            if next > file_len {
                // torn tail: keep the entry, stop scanning
                debug!(physical_start, "chunk payload extends past end of file, stopping scan");
                break;
            }
            input.seek(next)?;
        }
        Ok(Self::from_records(records, total_logical_len, file_len))
    }

    /// Index of an entry covering logical position `pos`. When several
    /// entries cover it, the earliest in append order is returned; the
    /// reader resolves the authoritative latest entry while reconciling.
    /// A position at or past the stream end maps to the last entry so
    /// seek-to-end can land on the final chunk boundary.
    pub fn find_owning_chunk(&self, pos: u64) -> Result<usize> {
        let n = self.records.len();
        if n == 0 {
            return Err(Error::OutOfRange {
                position: pos,
                length: self.total_logical_len,
            });
        }

        if n < LINEAR_SCAN_LIMIT {
            if let Some(idx) = self.records.iter().position(|rec| rec.covers(pos)) {
                return Ok(idx);
            }
        } else {
            // any covering entry starts within max_logical_len of pos
            let bracket = pos.saturating_sub(self.max_logical_len.saturating_add(1));
            let mut found: Option<usize> = None;
            let from = self.by_logical_start.partition_point(|&(start, _)| start < bracket);
            for &(start, idx) in &self.by_logical_start[from..] {
                if start > pos {
                    break;
                }
                if self.records[idx].covers(pos) {
                    found = Some(found.map_or(idx, |prev| prev.min(idx)));
                }
            }
            if let Some(idx) = found {
                return Ok(idx);
            }
        }

        if pos >= self.total_logical_len {
            return Ok(n - 1);
        }
        Err(Error::OutOfRange {
            position: pos,
            length: self.total_logical_len,
        })
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn record(&self, idx: usize) -> &ChunkRecord {
        &self.records[idx]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_logical_len(&self) -> u64 {
        self.total_logical_len
    }

    pub fn max_logical_len(&self) -> u64 {
        self.max_logical_len
    }

    pub fn max_physical_read(&self) -> u64 {
        self.max_physical_read
    }

    /// Physical offset where chunk data ends: the directory frame when one
    /// exists, end of file otherwise.
    pub fn directory_start(&self) -> u64 {
        self.directory_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(records: Vec<ChunkRecord>, total: u64) -> ChunkDirectory {
        ChunkDirectory::from_records(records, total, u64::MAX)
    }

    fn rec(logical_start: u64, physical_start: u64, logical_len: u64) -> ChunkRecord {
        ChunkRecord {
            logical_start,
            physical_start,
            logical_len,
        }
    }

    #[test]
    fn linear_lookup_finds_covering_chunk() {
        let dir = directory(vec![rec(0, 10, 100), rec(100, 200, 50)], 150);
        assert_eq!(dir.find_owning_chunk(0).unwrap(), 0);
        assert_eq!(dir.find_owning_chunk(99).unwrap(), 0);
        assert_eq!(dir.find_owning_chunk(100).unwrap(), 1);
        assert_eq!(dir.find_owning_chunk(149).unwrap(), 1);
    }

    #[test]
    fn lookup_at_end_returns_last_entry() {
        let dir = directory(vec![rec(0, 10, 100)], 100);
        assert_eq!(dir.find_owning_chunk(100).unwrap(), 0);
    }

    #[test]
    fn lookup_in_gap_is_out_of_range() {
        // hole between 50 and 100
        let dir = directory(vec![rec(0, 10, 50), rec(100, 200, 50)], 150);
        assert!(matches!(
            dir.find_owning_chunk(75),
            Err(Error::OutOfRange { position: 75, .. })
        ));
    }

    #[test]
    fn empty_directory_lookup_fails() {
        let dir = directory(Vec::new(), 0);
        assert!(dir.find_owning_chunk(0).is_err());
    }

    #[test]
    fn overlapping_entries_resolve_to_earliest_append_index() {
        let dir = directory(vec![rec(0, 10, 100), rec(20, 200, 10)], 100);
        assert_eq!(dir.find_owning_chunk(25).unwrap(), 0);
    }

    #[test]
    fn binary_search_path_matches_linear_results() {
        let mut records = Vec::new();
        for i in 0..200u64 {
            records.push(rec(i * 10, 16 + i * 40, 10));
        }
        let dir = directory(records.clone(), 2000);
        assert!(dir.len() >= LINEAR_SCAN_LIMIT);

        for pos in [0u64, 5, 10, 999, 1001, 1995, 1999] {
            let idx = dir.find_owning_chunk(pos).unwrap();
            assert!(records[idx].covers(pos), "pos {pos} got index {idx}");
        }
        assert!(dir.find_owning_chunk(2000).is_ok());
    }

    #[test]
    fn binary_search_path_prefers_earliest_of_overlaps() {
        let mut records = Vec::new();
        for i in 0..150u64 {
            records.push(rec(i * 10, 16 + i * 40, 10));
        }
        // late overwrite covering [500, 520)
        records.push(rec(500, 16 + 150 * 40, 20));
        let dir = directory(records, 1500);
        assert_eq!(dir.find_owning_chunk(505).unwrap(), 50);
    }

    #[test]
    fn max_lengths_computed_from_entries() {
        let dir = ChunkDirectory::from_records(
            vec![rec(0, 16, 100), rec(100, 80, 300), rec(400, 200, 10)],
            410,
            260,
        );
        assert_eq!(dir.max_logical_len(), 300);
        // physical deltas: 80-16=64, 200-80=120, 260-200=60
        assert_eq!(dir.max_physical_read(), 120);
    }
}
