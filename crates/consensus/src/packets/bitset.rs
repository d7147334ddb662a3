//! Tri-state bit set: per-node consensus verdicts packed two bits per cell.

use pulsenet_core::types::RecordRef;
use pulsenet_core::CoreError;

/// Verdict for one node within a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TriState {
    Legit = 0,
    TimedOut = 1,
    Fraud = 2,
}

impl TriState {
    fn from_bits(b: u8) -> Result<Self, CoreError> {
        match b {
            0 => Ok(TriState::Legit),
            1 => Ok(TriState::TimedOut),
            2 => Ok(TriState::Fraud),
            _ => Err(CoreError::Parse("invalid tri-state bits".into())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitSetCell {
    pub node_id: RecordRef,
    pub state: TriState,
}

/// Injective mapping between node refs and bit-set indices. Provided by the
/// node keeper's stable active-list ordering; every node derives the same
/// mapping from the same snapshot.
pub trait BitSetMapper {
    /// Index for a ref; `NodeMissing` if the ref is not in the mapping.
    fn ref_to_index(&self, id: &RecordRef) -> Result<usize, CoreError>;
    /// Ref for an index; `OutOfRange` if the index exceeds the length.
    fn index_to_ref(&self, index: usize) -> Result<RecordRef, CoreError>;
    fn length(&self) -> usize;
}

/// Cell array over a mapper's index space. Unlisted nodes default to
/// `Legit`; `apply_changes` is a full replace, never a merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriStateBitSet {
    cells: Vec<TriState>,
}

impl TriStateBitSet {
    pub fn new<M: BitSetMapper>(cells: &[BitSetCell], mapper: &M) -> Result<Self, CoreError> {
        let mut set = TriStateBitSet {
            cells: vec![TriState::Legit; mapper.length()],
        };
        set.apply_changes(cells, mapper)?;
        Ok(set)
    }

    /// Replace the whole cell set. The result equals a fresh construction
    /// from the same cells: no state leaks from before the call.
    pub fn apply_changes<M: BitSetMapper>(
        &mut self,
        cells: &[BitSetCell],
        mapper: &M,
    ) -> Result<(), CoreError> {
        let mut fresh = vec![TriState::Legit; mapper.length()];
        for cell in cells {
            let index = mapper.ref_to_index(&cell.node_id)?;
            if index >= fresh.len() {
                return Err(CoreError::OutOfRange);
            }
            fresh[index] = cell.state;
        }
        self.cells = fresh;
        Ok(())
    }

    pub fn get_cells<M: BitSetMapper>(&self, mapper: &M) -> Result<Vec<BitSetCell>, CoreError> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, state)| {
                Ok(BitSetCell {
                    node_id: mapper.index_to_ref(i)?,
                    state: *state,
                })
            })
            .collect()
    }

    pub fn state_at(&self, index: usize) -> Result<TriState, CoreError> {
        self.cells.get(index).copied().ok_or(CoreError::OutOfRange)
    }

    pub fn set_state(&mut self, index: usize, state: TriState) -> Result<(), CoreError> {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = state;
                Ok(())
            }
            None => Err(CoreError::OutOfRange),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn count(&self, state: TriState) -> usize {
        self.cells.iter().filter(|s| **s == state).count()
    }

    /// Pack two bits per cell, four cells per byte, low bits first.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.cells.len().div_ceil(4)];
        for (i, state) in self.cells.iter().enumerate() {
            out[i / 4] |= (*state as u8) << ((i % 4) * 2);
        }
        out
    }

    pub fn deserialize(buf: &[u8], cell_count: usize) -> Result<Self, CoreError> {
        if buf.len() != cell_count.div_ceil(4) {
            return Err(CoreError::Parse("bit set length mismatch".into()));
        }
        let mut cells = Vec::with_capacity(cell_count);
        for i in 0..cell_count {
            let bits = (buf[i / 4] >> ((i % 4) * 2)) & 0b11;
            cells.push(TriState::from_bits(bits)?);
        }
        Ok(TriStateBitSet { cells })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListMapper {
        refs: Vec<RecordRef>,
    }

    impl ListMapper {
        fn new(n: usize) -> Self {
            ListMapper {
                refs: (0..n).map(|_| RecordRef::random()).collect(),
            }
        }
    }

    impl BitSetMapper for ListMapper {
        fn ref_to_index(&self, id: &RecordRef) -> Result<usize, CoreError> {
            self.refs
                .iter()
                .position(|r| r == id)
                .ok_or(CoreError::NodeMissing)
        }

        fn index_to_ref(&self, index: usize) -> Result<RecordRef, CoreError> {
            self.refs.get(index).copied().ok_or(CoreError::OutOfRange)
        }

        fn length(&self) -> usize {
            self.refs.len()
        }
    }

    fn cells_for(mapper: &ListMapper, states: &[TriState]) -> Vec<BitSetCell> {
        states
            .iter()
            .enumerate()
            .map(|(i, s)| BitSetCell {
                node_id: mapper.refs[i],
                state: *s,
            })
            .collect()
    }

    #[test]
    fn construction_reproduces_cells() {
        let mapper = ListMapper::new(5);
        let cells = cells_for(
            &mapper,
            &[
                TriState::Legit,
                TriState::TimedOut,
                TriState::Fraud,
                TriState::Legit,
                TriState::TimedOut,
            ],
        );
        let set = TriStateBitSet::new(&cells, &mapper).unwrap();
        assert_eq!(set.get_cells(&mapper).unwrap(), cells);
    }

    #[test]
    fn apply_changes_is_full_replace() {
        let mapper = ListMapper::new(4);
        let first = cells_for(
            &mapper,
            &[TriState::Fraud, TriState::Fraud, TriState::Fraud, TriState::Fraud],
        );
        let mut set = TriStateBitSet::new(&first, &mapper).unwrap();

        // Replacement only lists one node; the rest reset to Legit instead
        // of keeping Fraud from before.
        let replacement = vec![BitSetCell {
            node_id: mapper.refs[2],
            state: TriState::TimedOut,
        }];
        set.apply_changes(&replacement, &mapper).unwrap();

        let fresh = TriStateBitSet::new(&replacement, &mapper).unwrap();
        assert_eq!(set, fresh);
        assert_eq!(set.count(TriState::Fraud), 0);
        assert_eq!(set.state_at(2).unwrap(), TriState::TimedOut);
    }

    #[test]
    fn unmapped_ref_is_node_missing() {
        let mapper = ListMapper::new(2);
        let stranger = BitSetCell {
            node_id: RecordRef::random(),
            state: TriState::Legit,
        };
        assert!(matches!(
            TriStateBitSet::new(&[stranger], &mapper),
            Err(CoreError::NodeMissing)
        ));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mapper = ListMapper::new(3);
        let set = TriStateBitSet::new(&[], &mapper).unwrap();
        assert!(matches!(set.state_at(3), Err(CoreError::OutOfRange)));
    }

    #[test]
    fn packed_roundtrip_with_odd_lengths() {
        for n in [1usize, 3, 4, 5, 9] {
            let mapper = ListMapper::new(n);
            let states: Vec<TriState> = (0..n)
                .map(|i| match i % 3 {
                    0 => TriState::Legit,
                    1 => TriState::TimedOut,
                    _ => TriState::Fraud,
                })
                .collect();
            let set = TriStateBitSet::new(&cells_for(&mapper, &states), &mapper).unwrap();
            let packed = set.serialize();
            assert_eq!(packed.len(), n.div_ceil(4));
            let restored = TriStateBitSet::deserialize(&packed, n).unwrap();
            assert_eq!(set, restored);
        }
    }

    #[test]
    fn invalid_bits_rejected() {
        // 0b11 is not a valid tri-state
        assert!(TriStateBitSet::deserialize(&[0b0000_0011], 1).is_err());
    }
}
