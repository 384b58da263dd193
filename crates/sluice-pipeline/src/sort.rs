//! Dependency ordering of compiled stages.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::CompileError;
use crate::stage::StageDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
  /// Every stage after all of its sources.
  InputsFirst,
  /// Every stage before all of its sources.
  OutputsFirst,
}

/// Order stages topologically over their sources.
///
/// Ties are broken by ordinal, so the result is deterministic. A source
/// naming a stage that is not in the list, or a cycle, is an error.
pub fn sort(stages: Vec<StageDef>, order: SortOrder) -> Result<Vec<StageDef>, CompileError> {
  let index: HashMap<&str, usize> = stages
    .iter()
    .enumerate()
    .map(|(i, s)| (s.name.as_str(), i))
    .collect();

  // downstream[i] lists stages consuming from stage i
  let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
  let mut indegree: Vec<usize> = vec![0; stages.len()];

  for (i, stage) in stages.iter().enumerate() {
    let mut upstream: HashSet<usize> = HashSet::new();
    for port in &stage.sources {
      let Some(&from) = index.get(port.stage.as_str()) else {
        return Err(CompileError::UnknownSource {
          stage: stage.name.clone(),
          upstream: port.stage.clone(),
        });
      };
      if upstream.insert(from) {
        downstream[from].push(i);
        indegree[i] += 1;
      }
    }
  }

  let mut ready: BinaryHeap<Reverse<(usize, usize)>> = stages
    .iter()
    .enumerate()
    .filter(|(i, _)| indegree[*i] == 0)
    .map(|(i, s)| Reverse((s.ordinal, i)))
    .collect();

  let mut sequence = Vec::with_capacity(stages.len());
  while let Some(Reverse((_, i))) = ready.pop() {
    sequence.push(i);
    for &next in &downstream[i] {
      indegree[next] -= 1;
      if indegree[next] == 0 {
        ready.push(Reverse((stages[next].ordinal, next)));
      }
    }
  }

  if sequence.len() != stages.len() {
    let stuck = (0..stages.len())
      .find(|i| indegree[*i] > 0)
      .map(|i| stages[i].name.clone())
      .unwrap_or_default();
    return Err(CompileError::Cycle { stage: stuck });
  }

  if order == SortOrder::OutputsFirst {
    sequence.reverse();
  }

  let mut slots: Vec<Option<StageDef>> = stages.into_iter().map(Some).collect();
  Ok(
    sequence
      .into_iter()
      .filter_map(|i| slots[i].take())
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stage::Port;
  use sluice_config::StageKind;
  use std::path::PathBuf;

  fn stage(name: &str, ordinal: usize, sources: &[&str]) -> StageDef {
    StageDef {
      pipeline: "p".into(),
      name: name.into(),
      ordinal,
      label: name.into(),
      kind: StageKind::Filter,
      plugin: "x".into(),
      options: Default::default(),
      sources: sources.iter().map(|s| Port::new(*s, 0)).collect(),
      buffer: 1,
      pool_size: 1,
      schedule: None,
      trace: false,
      working_dir: PathBuf::from("."),
    }
  }

  fn names(stages: &[StageDef]) -> Vec<&str> {
    stages.iter().map(|s| s.name.as_str()).collect()
  }

  #[test]
  fn test_inputs_and_outputs_first() {
    let stages = vec![
      stage("out", 4, &["b", "c"]),
      stage("c", 3, &["a"]),
      stage("b", 2, &["a"]),
      stage("a", 1, &[]),
    ];
    let forward = sort(stages.clone(), SortOrder::InputsFirst).unwrap();
    assert_eq!(names(&forward), vec!["a", "b", "c", "out"]);
    let backward = sort(stages, SortOrder::OutputsFirst).unwrap();
    assert_eq!(names(&backward), vec!["out", "c", "b", "a"]);
  }

  #[test]
  fn test_unknown_source() {
    let err = sort(vec![stage("a", 1, &["ghost"])], SortOrder::InputsFirst).unwrap_err();
    assert!(matches!(err, CompileError::UnknownSource { upstream, .. } if upstream == "ghost"));
  }

  #[test]
  fn test_cycle() {
    let err = sort(
      vec![stage("a", 1, &["b"]), stage("b", 2, &["a"])],
      SortOrder::InputsFirst,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Cycle { .. }));
  }
}
