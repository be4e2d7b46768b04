use std::collections::BTreeMap;

/// Index-addressed values collected from the page, densified on demand.
///
/// Later writes to an index replace earlier ones.
#[derive(Debug, Clone)]
pub struct SparseArray<T> {
    values: BTreeMap<usize, T>,
}

impl<T> SparseArray<T> {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, index: usize, value: T) {
        self.values.insert(index, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One past the highest index written, i.e. the dense length.
    pub fn dense_len(&self) -> usize {
        self.values.keys().next_back().map_or(0, |max| max + 1)
    }

    /// Dense vector with `None` in every gap.
    pub fn into_dense(self) -> Vec<Option<T>> {
        let mut dense = Vec::new();
        dense.resize_with(self.dense_len(), || None);
        for (index, value) in self.values {
            dense[index] = Some(value);
        }
        dense
    }
}

impl<T> Default for SparseArray<T> {
    fn default() -> Self {
        Self::new()
    }
}
