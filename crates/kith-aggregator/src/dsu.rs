//! Disjoint-set partitioning of raw contacts with separation constraints.
//!
//! A union that would place two raw contacts held apart by a directive in the
//! same set is refused and reported as [`MergeOutcome::Blocked`]. Because the
//! check runs on every union, separations win over any chain of merges.

use std::collections::{BTreeMap, BTreeSet};

use kith_core::contact::RawContactId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
  Merged,
  AlreadyMerged,
  Blocked,
}

#[derive(Debug, Default)]
pub struct Partition {
  parent:  BTreeMap<RawContactId, RawContactId>,
  /// Members of each root's set.
  members: BTreeMap<RawContactId, BTreeSet<RawContactId>>,
  apart:   BTreeMap<RawContactId, BTreeSet<RawContactId>>,
}

impl Partition {
  pub fn new(ids: impl IntoIterator<Item = RawContactId>) -> Self {
    let mut partition = Self::default();
    for id in ids {
      partition.ensure(id);
    }
    partition
  }

  fn ensure(&mut self, id: RawContactId) {
    if !self.parent.contains_key(&id) {
      self.parent.insert(id, id);
      self.members.insert(id, BTreeSet::from([id]));
    }
  }

  /// Forbid `a` and `b` from ever sharing a set.
  pub fn keep_apart(&mut self, a: RawContactId, b: RawContactId) {
    self.ensure(a);
    self.ensure(b);
    self.apart.entry(a).or_default().insert(b);
    self.apart.entry(b).or_default().insert(a);
  }

  pub fn find(&mut self, id: RawContactId) -> RawContactId {
    self.ensure(id);
    let mut x = id;
    loop {
      let parent = self.parent[&x];
      if parent == x {
        return x;
      }
      // Path halving.
      let grandparent = self.parent[&parent];
      self.parent.insert(x, grandparent);
      x = grandparent;
    }
  }

  pub fn union(&mut self, a: RawContactId, b: RawContactId) -> MergeOutcome {
    let root_a = self.find(a);
    let root_b = self.find(b);
    if root_a == root_b {
      return MergeOutcome::AlreadyMerged;
    }

    let (Some(set_a), Some(set_b)) =
      (self.members.get(&root_a), self.members.get(&root_b))
    else {
      return MergeOutcome::Blocked;
    };
    let blocked = set_a.iter().any(|member| {
      self
        .apart
        .get(member)
        .is_some_and(|others| !others.is_disjoint(set_b))
    });
    if blocked {
      return MergeOutcome::Blocked;
    }

    let (keep, absorb) = if set_a.len() >= set_b.len() {
      (root_a, root_b)
    } else {
      (root_b, root_a)
    };
    let moved = self.members.remove(&absorb).unwrap_or_default();
    self.members.entry(keep).or_default().extend(moved);
    self.parent.insert(absorb, keep);
    MergeOutcome::Merged
  }

  /// The final sets, each ascending, ordered by their smallest member.
  pub fn groups(self) -> Vec<Vec<RawContactId>> {
    let mut groups: Vec<Vec<RawContactId>> = self
      .members
      .into_values()
      .map(|set| set.into_iter().collect())
      .collect();
    groups.sort_by_key(|group| group.first().copied());
    groups
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids(raw: &[i64]) -> Vec<RawContactId> {
    raw.iter().copied().map(RawContactId).collect()
  }

  #[test]
  fn unions_build_transitive_sets() {
    let mut p = Partition::new(ids(&[1, 2, 3, 4]));
    assert_eq!(p.union(RawContactId(1), RawContactId(2)), MergeOutcome::Merged);
    assert_eq!(p.union(RawContactId(2), RawContactId(3)), MergeOutcome::Merged);
    assert_eq!(
      p.union(RawContactId(3), RawContactId(1)),
      MergeOutcome::AlreadyMerged
    );
    assert_eq!(p.groups(), vec![ids(&[1, 2, 3]), ids(&[4])]);
  }

  #[test]
  fn separation_blocks_indirect_merge() {
    let mut p = Partition::new(ids(&[1, 2, 3]));
    p.keep_apart(RawContactId(1), RawContactId(3));
    assert_eq!(p.union(RawContactId(1), RawContactId(2)), MergeOutcome::Merged);
    assert_eq!(p.union(RawContactId(2), RawContactId(3)), MergeOutcome::Blocked);
    assert_eq!(p.groups(), vec![ids(&[1, 2]), ids(&[3])]);
  }

  #[test]
  fn first_union_wins_when_order_matters() {
    // 2 may join 1 or 3 but 1 and 3 must stay apart.
    let mut p = Partition::new(ids(&[1, 2, 3]));
    p.keep_apart(RawContactId(1), RawContactId(3));
    p.union(RawContactId(2), RawContactId(3));
    p.union(RawContactId(1), RawContactId(2));
    assert_eq!(p.groups(), vec![ids(&[1]), ids(&[2, 3])]);
  }
}
