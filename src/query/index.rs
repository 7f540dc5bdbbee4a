use std::cmp::Ordering;
use std::collections::HashMap;

use crate::package::{PackageId, PackageMetadata};

/// Order in which indexed packages are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// By id, ascending.
    #[default]
    Id,
    /// By download count, descending; ties by id.
    Downloads,
}

impl SortOrder {
    pub fn compare(&self, a: &PackageMetadata, b: &PackageMetadata) -> Ordering {
        match self {
            SortOrder::Id => a.id.cmp(&b.id),
            SortOrder::Downloads => b
                .download_count
                .cmp(&a.download_count)
                .then_with(|| a.id.cmp(&b.id)),
        }
    }
}

/// Highest-version record per package id.
///
/// A record whose version is lower than or equal to the stored one for its
/// id is ignored, so inserting the same batch twice changes nothing.
#[derive(Debug, Clone, Default)]
pub struct SortedPackageIndex {
    entries: HashMap<PackageId, PackageMetadata>,
    order: SortOrder,
}

impl SortedPackageIndex {
    pub fn new(order: SortOrder) -> Self {
        Self {
            entries: HashMap::new(),
            order,
        }
    }

    /// Insert one record. Returns `true` if the index changed.
    pub fn add(&mut self, meta: PackageMetadata) -> bool {
        match self.entries.get(&meta.id) {
            Some(existing) if existing.version >= meta.version => false,
            _ => {
                self.entries.insert(meta.id.clone(), meta);
                true
            }
        }
    }

    /// Insert a batch. Returns how many records changed the index.
    pub fn add_range<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = PackageMetadata>,
    {
        batch.into_iter().filter(|meta| self.add(meta.clone())).count()
    }

    pub fn get(&self, id: &PackageId) -> Option<&PackageMetadata> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every record in sort order.
    pub fn sorted(&self) -> Vec<&PackageMetadata> {
        let mut all: Vec<&PackageMetadata> = self.entries.values().collect();
        all.sort_by(|a, b| self.order.compare(a, b));
        all
    }
}
