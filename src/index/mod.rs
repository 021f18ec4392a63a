// Mon Feb 2 2026 - Alex

use crate::codec::{name_hash, ByteStream, CodecError};

/// One slot of a scope's open-addressing table. Id 0 is the empty
/// sentinel; real wire ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSlot {
    pub id: u32,
    pub hash: u32,
}

pub const EMPTY_SLOT: HashSlot = HashSlot { id: 0, hash: 0 };

/// Size of one serialized slot: id:u32 + hash:u32, both little-endian.
pub const SLOT_BYTES: u64 = 8;

/// Build the table for a scope of `entries` (name, wire id) pairs. The
/// start slot is `hash(name) % n`; collisions probe linearly forward,
/// wrapping at n. The reader's probe below walks the same sequence, so
/// any change here must be mirrored there.
pub fn build_slots(entries: &[(&str, u32)]) -> Vec<HashSlot> {
    let n = entries.len();
    let mut slots = vec![EMPTY_SLOT; n];
    for &(name, id) in entries {
        let hash = name_hash(name);
        let mut slot = (hash as usize) % n;
        while slots[slot].id != 0 {
            slot = (slot + 1) % n;
        }
        slots[slot] = HashSlot { id, hash };
    }
    slots
}

pub fn write_slots(stream: &mut ByteStream, slots: &[HashSlot]) -> Result<(), CodecError> {
    for slot in slots {
        stream.write_u32(slot.id)?;
        stream.write_u32(slot.hash)?;
    }
    Ok(())
}

/// Outcome of probing one table for a name. `Candidate` means the stored
/// hash matched; the caller must still compare the stored name at the
/// candidate's address and resume from `next` on mismatch, since a
/// colliding hash with a different name must keep probing, not fail.
pub enum ProbeStep {
    Candidate { id: u32, next: ProbeCursor },
    NotFound,
}

/// Resumable probe position inside a table.
#[derive(Debug, Clone, Copy)]
pub struct ProbeCursor {
    table_pos: u64,
    len: u32,
    slot: u32,
    visited: u32,
}

impl ProbeCursor {
    /// Begin a probe over the table serialized at `table_pos` with `len`
    /// slots, for the given precomputed name hash.
    pub fn start(table_pos: u64, len: u32, hash: u32) -> Self {
        Self { table_pos, len, slot: hash % len, visited: 0 }
    }

    /// Advance until the next hash match, the empty sentinel, or a full
    /// wrap. Restores nothing: the caller owns cursor discipline around
    /// the shared stream.
    pub fn step(mut self, stream: &mut ByteStream, hash: u32) -> Result<ProbeStep, CodecError> {
        while self.visited < self.len {
            stream.seek(self.table_pos + self.slot as u64 * SLOT_BYTES)?;
            let id = stream.read_u32()?;
            let stored_hash = stream.read_u32()?;
            self.slot = (self.slot + 1) % self.len;
            self.visited += 1;
            if id == 0 {
                return Ok(ProbeStep::NotFound);
            }
            if stored_hash == hash {
                return Ok(ProbeStep::Candidate { id, next: self });
            }
        }
        Ok(ProbeStep::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::name_hash;

    fn probe_all(stream: &mut ByteStream, table_pos: u64, len: u32, name: &str) -> Vec<u32> {
        // Collect every candidate id for `name`, simulating the reader's
        // hash-then-name comparison by just gathering candidates.
        let hash = name_hash(name);
        let mut cursor = ProbeCursor::start(table_pos, len, hash);
        let mut out = Vec::new();
        loop {
            match cursor.step(stream, hash).unwrap() {
                ProbeStep::Candidate { id, next } => {
                    out.push(id);
                    cursor = next;
                }
                ProbeStep::NotFound => return out,
            }
        }
    }

    #[test]
    fn test_build_and_probe_agree() {
        let names = ["Workspace", "Players", "Lighting", "ReplicatedStorage", "RunService"];
        let entries: Vec<(&str, u32)> =
            names.iter().enumerate().map(|(i, &n)| (n, i as u32 + 1)).collect();
        let slots = build_slots(&entries);

        let mut stream = ByteStream::new();
        write_slots(&mut stream, &slots).unwrap();

        for (i, &name) in names.iter().enumerate() {
            let candidates = probe_all(&mut stream, 0, names.len() as u32, name);
            assert!(
                candidates.contains(&(i as u32 + 1)),
                "{} not reachable by probe",
                name
            );
        }
    }

    #[test]
    fn test_absent_name_not_found() {
        let entries = [("alpha", 1u32), ("beta", 2u32)];
        let slots = build_slots(&entries);
        let mut stream = ByteStream::new();
        write_slots(&mut stream, &slots).unwrap();

        let hash = name_hash("gamma");
        let cursor = ProbeCursor::start(0, 2, hash);
        // gamma either hits the sentinel or exhausts both slots without a
        // matching hash; either way every candidate is a different name's id.
        match cursor.step(&mut stream, hash).unwrap() {
            ProbeStep::NotFound => {}
            ProbeStep::Candidate { id, .. } => assert!(id == 1 || id == 2),
        }
    }

    #[test]
    fn test_full_table_probe_terminates() {
        // Both entries collide into a 2-slot table; wrap must terminate.
        let entries = [("aa", 1u32), ("bb", 2u32)];
        let slots = build_slots(&entries);
        assert_eq!(slots.iter().filter(|s| s.id != 0).count(), 2);

        let mut stream = ByteStream::new();
        write_slots(&mut stream, &slots).unwrap();
        let hash = name_hash("cc");
        let mut cursor = ProbeCursor::start(0, 2, hash);
        let mut steps = 0;
        loop {
            match cursor.step(&mut stream, hash).unwrap() {
                ProbeStep::Candidate { next, .. } => {
                    cursor = next;
                    steps += 1;
                    assert!(steps <= 2);
                }
                ProbeStep::NotFound => break,
            }
        }
    }
}
