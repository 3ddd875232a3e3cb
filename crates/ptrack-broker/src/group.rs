use std::collections::BTreeMap;

/// Range assignment: partitions are split into contiguous runs over the
/// members in sorted order; the first `partitions % members` members get one
/// extra partition.
pub fn range_assignment(partitions: u32, members: &[String], member: &str) -> Vec<u32> {
    let mut sorted: Vec<&String> = members.iter().collect();
    sorted.sort();
    let Some(index) = sorted.iter().position(|m| m.as_str() == member) else {
        return Vec::new();
    };

    let count = sorted.len() as u32;
    let base = partitions / count;
    let extra = partitions % count;
    let index = index as u32;
    let start = index * base + index.min(extra);
    let len = base + u32::from(index < extra);
    (start..start + len).collect()
}

#[derive(Debug, Default)]
struct Membership {
    members: Vec<String>,
    generation: u64,
}

/// Live members of each consumer group, per topic.
///
/// Every join or leave bumps the group's generation; consumers compare
/// generations to notice a rebalance.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: BTreeMap<(String, String), Membership>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member`; returns the new generation.
    pub fn join(&mut self, group: &str, topic: &str, member: &str) -> u64 {
        let entry = self
            .groups
            .entry((group.to_string(), topic.to_string()))
            .or_default();
        if !entry.members.iter().any(|m| m == member) {
            entry.members.push(member.to_string());
            entry.generation += 1;
        }
        entry.generation
    }

    pub fn leave(&mut self, group: &str, topic: &str, member: &str) {
        if let Some(entry) = self.groups.get_mut(&(group.to_string(), topic.to_string())) {
            let before = entry.members.len();
            entry.members.retain(|m| m != member);
            if entry.members.len() != before {
                entry.generation += 1;
            }
        }
    }

    pub fn generation(&self, group: &str, topic: &str) -> u64 {
        self.groups
            .get(&(group.to_string(), topic.to_string()))
            .map(|m| m.generation)
            .unwrap_or(0)
    }

    pub fn members(&self, group: &str, topic: &str) -> Vec<String> {
        self.groups
            .get(&(group.to_string(), topic.to_string()))
            .map(|m| m.members.clone())
            .unwrap_or_default()
    }

    /// Partitions of `topic` currently owned by `member`.
    pub fn assignment(&self, group: &str, topic: &str, member: &str, partitions: u32) -> Vec<u32> {
        range_assignment(partitions, &self.members(group, topic), member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{i}")).collect()
    }

    #[test]
    fn single_member_owns_everything() {
        assert_eq!(range_assignment(3, &names(1), "m0"), vec![0, 1, 2]);
    }

    #[test]
    fn uneven_split_front_loads_extras() {
        let members = names(2);
        assert_eq!(range_assignment(3, &members, "m0"), vec![0, 1]);
        assert_eq!(range_assignment(3, &members, "m1"), vec![2]);
        assert!(range_assignment(3, &members, "stranger").is_empty());
    }

    #[test]
    fn join_and_leave_rebalance() {
        let mut reg = GroupRegistry::new();
        let g1 = reg.join("g", "t", "a");
        assert_eq!(reg.assignment("g", "t", "a", 4), vec![0, 1, 2, 3]);

        let g2 = reg.join("g", "t", "b");
        assert!(g2 > g1);
        assert_eq!(reg.assignment("g", "t", "a", 4), vec![0, 1]);
        assert_eq!(reg.assignment("g", "t", "b", 4), vec![2, 3]);

        reg.leave("g", "t", "a");
        assert!(reg.generation("g", "t") > g2);
        assert_eq!(reg.assignment("g", "t", "b", 4), vec![0, 1, 2, 3]);
    }

    proptest! {
        #[test]
        fn assignments_are_disjoint_and_complete(partitions in 0u32..16, n in 1usize..6) {
            let members = names(n);
            let mut all: Vec<u32> = members
                .iter()
                .flat_map(|m| range_assignment(partitions, &members, m))
                .collect();
            all.sort();
            prop_assert_eq!(all, (0..partitions).collect::<Vec<_>>());
        }
    }
}
