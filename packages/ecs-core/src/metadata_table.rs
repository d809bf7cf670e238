//! Sparse per-(entity, component) part descriptors.
//!
//! Large components can be split into fixed-size "parts" so a delta only
//! needs to carry the parts that actually changed. Absence of an entry
//! means "all parts present", not "no parts" — most entities never touch
//! this table.

use std::collections::HashMap;

/// Bitmap over up to 64 parts of one component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartDescriptor(u64);

impl PartDescriptor {
    pub const ALL: PartDescriptor = PartDescriptor(u64::MAX);
    pub const NONE: PartDescriptor = PartDescriptor(0);

    pub fn has_part(&self, part: u32) -> bool {
        part < 64 && self.0 & (1u64 << part) != 0
    }

    pub fn set_part(&mut self, part: u32) {
        if part < 64 {
            self.0 |= 1u64 << part;
        }
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

#[derive(Debug, Default)]
pub struct MetadataTable {
    entries: HashMap<(u32, u16), PartDescriptor>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, entity_index: u32, type_id: u16, desc: PartDescriptor) {
        self.entries.insert((entity_index, type_id), desc);
    }

    /// Default (unset) semantics: the entire component is live.
    pub fn get(&self, entity_index: u32, type_id: u16) -> PartDescriptor {
        self.entries
            .get(&(entity_index, type_id))
            .copied()
            .unwrap_or(PartDescriptor::ALL)
    }

    pub fn has_part(&self, entity_index: u32, type_id: u16, part: u32) -> bool {
        self.get(entity_index, type_id).has_part(part)
    }

    pub fn clear_component(&mut self, entity_index: u32, type_id: u16) {
        self.entries.remove(&(entity_index, type_id));
    }

    pub fn clear_entity(&mut self, entity_index: u32) {
        self.entries.retain(|(idx, _), _| *idx != entity_index);
    }

    /// Compares two equal-sized payloads in fixed-size parts and returns
    /// the bitmap of parts that differ.
    pub fn get_changed_parts(a: &[u8], b: &[u8], part_size: usize) -> PartDescriptor {
        debug_assert_eq!(a.len(), b.len());
        let mut desc = PartDescriptor::NONE;
        for (part, (chunk_a, chunk_b)) in a.chunks(part_size).zip(b.chunks(part_size)).enumerate()
        {
            if chunk_a != chunk_b {
                desc.set_part(part as u32);
            }
        }
        desc
    }

    /// Copies only the parts marked in `desc` from `src` into `dst`.
    pub fn copy_parts(dst: &mut [u8], src: &[u8], desc: PartDescriptor, part_size: usize) {
        debug_assert_eq!(dst.len(), src.len());
        let part_count = dst.len().div_ceil(part_size);
        for part in 0..part_count.min(64) {
            if !desc.has_part(part as u32) {
                continue;
            }
            let start = part * part_size;
            let end = (start + part_size).min(dst.len());
            dst[start..end].copy_from_slice(&src[start..end]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_entry_means_all_parts_present() {
        let table = MetadataTable::new();
        assert_eq!(table.get(1, 2), PartDescriptor::ALL);
        assert!(table.has_part(1, 2, 0));
        assert!(table.has_part(1, 2, 63));
    }

    #[test]
    fn set_and_clear_round_trip() {
        let mut table = MetadataTable::new();
        let mut desc = PartDescriptor::NONE;
        desc.set_part(3);
        table.set(5, 9, desc);
        assert!(table.has_part(5, 9, 3));
        assert!(!table.has_part(5, 9, 4));
        table.clear_component(5, 9);
        assert_eq!(table.get(5, 9), PartDescriptor::ALL);
    }

    #[test]
    fn changed_parts_detects_only_differing_chunks() {
        let a = vec![0u8; 64];
        let mut b = a.clone();
        b[40] = 1;
        let desc = MetadataTable::get_changed_parts(&a, &b, 16);
        assert!(!desc.has_part(0));
        assert!(!desc.has_part(1));
        assert!(desc.has_part(2));
        assert!(!desc.has_part(3));
    }

    #[test]
    fn copy_parts_only_touches_marked_parts() {
        let src = vec![9u8; 32];
        let mut dst = vec![0u8; 32];
        let mut desc = PartDescriptor::NONE;
        desc.set_part(1);
        MetadataTable::copy_parts(&mut dst, &src, desc, 16);
        assert_eq!(&dst[0..16], &[0u8; 16][..]);
        assert_eq!(&dst[16..32], &[9u8; 16][..]);
    }
}
