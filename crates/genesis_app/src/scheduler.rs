//! System scheduler: conflict detection and stage computation.
//!
//! Systems are grouped into **stages** by their read/write access sets.
//! Systems within a stage do not conflict and read the world concurrently.
//! Stages execute in order, with command buffer playback between them.

use genesis_component::QueryDescriptor;

/// A stage is a group of systems that can run in parallel (no conflicts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Indices into the registry, in registration order.
    pub system_indices: Vec<usize>,
}

/// Computes execution stages from the systems' queries.
///
/// Greedy colouring: each system joins the first stage holding no system it
/// conflicts with, or opens a new stage. Valid but not necessarily minimal.
#[must_use]
pub fn compute_stages<'q>(queries: impl IntoIterator<Item = &'q QueryDescriptor>) -> Vec<Stage> {
    let queries: Vec<&QueryDescriptor> = queries.into_iter().collect();
    let mut stages: Vec<Stage> = Vec::new();

    for (index, query) in queries.iter().enumerate() {
        let free = stages.iter_mut().find(|stage| {
            !stage
                .system_indices
                .iter()
                .any(|&other| query.conflicts_with(queries[other]))
        });
        match free {
            Some(stage) => stage.system_indices.push(index),
            None => stages.push(Stage {
                system_indices: vec![index],
            }),
        }
    }

    stages
}

#[cfg(test)]
mod tests {
    use genesis_component::ComponentTypeId;

    use super::*;

    const POSITION: u64 = 1;
    const VELOCITY: u64 = 2;
    const LIFETIME: u64 = 3;

    fn query(reads: &[u64], writes: &[u64]) -> QueryDescriptor {
        let mut query = QueryDescriptor::new();
        for &r in reads {
            query = query.read(ComponentTypeId(r));
        }
        for &w in writes {
            query = query.write(ComponentTypeId(w));
        }
        query
    }

    #[test]
    fn test_no_systems_no_stages() {
        let none: [QueryDescriptor; 0] = [];
        assert!(compute_stages(&none).is_empty());
    }

    #[test]
    fn test_disjoint_writers_share_a_stage() {
        let queries = [
            query(&[VELOCITY], &[POSITION]),
            query(&[], &[LIFETIME]),
        ];
        let stages = compute_stages(&queries);
        assert_eq!(stages, vec![Stage { system_indices: vec![0, 1] }]);
    }

    #[test]
    fn test_reader_after_writer_gets_own_stage() {
        let queries = [
            query(&[VELOCITY], &[POSITION]),
            query(&[], &[LIFETIME]),
            query(&[LIFETIME], &[]),
        ];
        let stages = compute_stages(&queries);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].system_indices, vec![0, 1]);
        assert_eq!(stages[1].system_indices, vec![2]);
    }

    #[test]
    fn test_later_system_backfills_earlier_stage() {
        // The third system conflicts with the second but not the first, so it
        // joins stage 0 rather than opening stage 2.
        let queries = [
            query(&[POSITION], &[]),
            query(&[], &[POSITION, VELOCITY]),
            query(&[VELOCITY], &[LIFETIME]),
        ];
        let stages = compute_stages(&queries);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].system_indices, vec![0, 2]);
        assert_eq!(stages[1].system_indices, vec![1]);
    }
}
