//! Configuration to stage graph compilation.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use sluice_config::{Branch, Configuration, Plugin, StageKind};
use tracing::debug;

use crate::error::CompileError;
use crate::source::{ContentProvider, FsContentProvider, substitute_vars};
use crate::stage::{DEFAULT_BUFFER, DEFAULT_FILTER_POOL_SIZE, DEFAULT_POOL_SIZE, Port, StageDef};

const USE_PLUGIN: &str = "use";
const ROUTE_PLUGIN: &str = "route";
const ROUTE_MATCHED_PORT: usize = 0;
const ROUTE_TRUNK_PORT: usize = 1;

/// Stages built by one step (newest first) and the ports it leaves open.
struct Built {
  stages: Vec<StageDef>,
  ports: Vec<Port>,
}

impl Built {
  fn single(stage: StageDef, ports: Vec<Port>) -> Self {
    Self {
      stages: vec![stage],
      ports,
    }
  }
}

/// Compile a parsed configuration, resolving imports from the file system.
pub fn compile(pipeline: &str, config: &Configuration, working_dir: &Path) -> Result<Vec<StageDef>, CompileError> {
  Compiler::new(pipeline, &FsContentProvider).compile(config, working_dir)
}

/// Turns configurations into stage definitions.
///
/// One compiler numbers stages with a single counter, so names stay unique
/// across every file a pipeline imports.
pub struct Compiler<'a> {
  pipeline: String,
  provider: &'a dyn ContentProvider,
  ordinal: usize,
  imports: Vec<String>,
}

impl<'a> Compiler<'a> {
  pub fn new(pipeline: impl Into<String>, provider: &'a dyn ContentProvider) -> Self {
    Self {
      pipeline: pipeline.into(),
      provider,
      ordinal: 0,
      imports: Vec::new(),
    }
  }

  /// Substitute `${VAR}` references, parse and compile `text`.
  pub fn compile_text(&mut self, location: &str, text: &str, working_dir: &Path) -> Result<Vec<StageDef>, CompileError> {
    let text = substitute_vars(text, &BTreeMap::new());
    let config = sluice_config::parse(&text).map_err(|source| CompileError::Parse {
      location: location.to_string(),
      source,
    })?;
    self.imports.push(location.to_string());
    let result = self.compile(&config, working_dir);
    self.imports.pop();
    result
  }

  /// Compile every section of `config`.
  pub fn compile(&mut self, config: &Configuration, working_dir: &Path) -> Result<Vec<StageDef>, CompileError> {
    let built = self.sections(config, working_dir, &StageKind::ALL, Vec::new())?;
    debug!(pipeline = %self.pipeline, stages = built.stages.len(), "pipeline_compiled");
    Ok(built.stages)
  }

  fn sections(
    &mut self,
    config: &Configuration,
    working_dir: &Path,
    pick: &[StageKind],
    seed: Vec<Port>,
  ) -> Result<Built, CompileError> {
    let mut stages: Vec<StageDef> = Vec::new();
    let mut ports = seed;

    if pick.contains(&StageKind::Input)
      && let Some(section) = config.section(StageKind::Input)
    {
      for plugin in &section.plugins {
        let built = self.input(plugin, working_dir)?;
        prepend(&mut stages, built.stages);
        ports.extend(built.ports);
      }
    }

    if pick.contains(&StageKind::Filter)
      && let Some(section) = config.section(StageKind::Filter)
    {
      for plugin in &section.plugins {
        let built = self.filter(plugin, ports, working_dir)?;
        prepend(&mut stages, built.stages);
        ports = built.ports;
      }
    }

    if pick.contains(&StageKind::Output)
      && let Some(section) = config.section(StageKind::Output)
    {
      for plugin in &section.plugins {
        let built = self.output(plugin, ports.clone(), working_dir)?;
        prepend(&mut stages, built.stages);
      }
    }

    Ok(Built { stages, ports })
  }

  fn input(&mut self, plugin: &Plugin, working_dir: &Path) -> Result<Built, CompileError> {
    let mut stage = self.new_stage(StageKind::Input, plugin, working_dir);

    if !plugin.branches.is_empty() {
      return Err(CompileError::InvalidStage {
        stage: stage.name,
        message: "conditionals are not allowed in the input section".to_string(),
      });
    }

    if plugin.name == USE_PLUGIN
      && let Some(paths) = import_paths(&mut stage)?
    {
      let mut imported = Vec::new();
      for path in &paths {
        let sub = self.import(path, &stage, &[StageKind::Input, StageKind::Filter], Vec::new())?;
        for port in sub.ports {
          stage.add_source(port);
        }
        imported.extend(sub.stages);
      }
      let port = stage.port(0);
      let mut stages = vec![stage];
      stages.extend(imported);
      return Ok(Built {
        stages,
        ports: vec![port],
      });
    }

    let port = stage.port(0);
    Ok(Built::single(stage, vec![port]))
  }

  fn filter(&mut self, plugin: &Plugin, last_ports: Vec<Port>, working_dir: &Path) -> Result<Built, CompileError> {
    let mut stage = self.new_stage(StageKind::Filter, plugin, working_dir);

    if plugin.name == USE_PLUGIN
      && let Some(paths) = import_paths(&mut stage)?
    {
      // A single import is spliced in directly.
      if let [path] = paths.as_slice() {
        return self.import(path, &stage, &[StageKind::Filter], last_ports);
      }

      // Several imports split the flow and join again on the use stage.
      let mut imported = Vec::new();
      for path in &paths {
        let sub = self.import(path, &stage, &[StageKind::Filter], last_ports.clone())?;
        for port in sub.ports {
          stage.add_source(port);
        }
        imported.extend(sub.stages);
      }
      let port = stage.port(0);
      let mut stages = vec![stage];
      stages.extend(imported);
      return Ok(Built {
        stages,
        ports: vec![port],
      });
    }

    for port in last_ports {
      stage.add_source(port);
    }

    if plugin.name == ROUTE_PLUGIN {
      let matched = stage.port(ROUTE_MATCHED_PORT);
      let trunk = stage.port(ROUTE_TRUNK_PORT);
      return match import_paths(&mut stage)? {
        Some(paths) => {
          let mut imported = Vec::new();
          for path in &paths {
            let sub = self.import(
              path,
              &stage,
              &[StageKind::Filter, StageKind::Output],
              vec![matched.clone()],
            )?;
            imported.extend(sub.stages);
          }
          let mut stages = vec![stage];
          stages.extend(imported);
          Ok(Built {
            stages,
            ports: vec![trunk],
          })
        }
        None => Ok(Built::single(stage, vec![matched, trunk])),
      };
    }

    if plugin.branches.is_empty() {
      let port = stage.port(0);
      return Ok(Built::single(stage, vec![port]));
    }

    let (children, ports) = self.branches(&mut stage, &plugin.branches, StageKind::Filter, working_dir)?;
    let mut stages = vec![stage];
    stages.extend(children);
    Ok(Built { stages, ports })
  }

  fn output(&mut self, plugin: &Plugin, last_ports: Vec<Port>, working_dir: &Path) -> Result<Built, CompileError> {
    let mut stage = self.new_stage(StageKind::Output, plugin, working_dir);

    if plugin.name == USE_PLUGIN
      && let Some(paths) = import_paths(&mut stage)?
    {
      let mut stages = Vec::new();
      for path in &paths {
        let sub = self.import(
          path,
          &stage,
          &[StageKind::Filter, StageKind::Output],
          last_ports.clone(),
        )?;
        stages.extend(sub.stages);
      }
      return Ok(Built {
        stages,
        ports: Vec::new(),
      });
    }

    for port in last_ports {
      stage.add_source(port);
    }

    let mut stages = Vec::new();
    if !plugin.branches.is_empty() {
      let (children, _) = self.branches(&mut stage, &plugin.branches, StageKind::Output, working_dir)?;
      stages = children;
    }
    stages.insert(0, stage);
    Ok(Built {
      stages,
      ports: Vec::new(),
    })
  }

  /// Expand conditional branches hanging off `stage`.
  ///
  /// Branch `i` leaves `stage` through port `i`. Without a literal `true`
  /// branch, one is appended and its port leads the returned port list.
  fn branches(
    &mut self,
    stage: &mut StageDef,
    branches: &[Branch],
    kind: StageKind,
    working_dir: &Path,
  ) -> Result<(Vec<StageDef>, Vec<Port>), CompileError> {
    let mut expressions = Map::new();
    let mut children: Vec<StageDef> = Vec::new();
    let mut ports: Vec<Port> = Vec::new();
    let mut has_else = false;

    for (index, branch) in branches.iter().enumerate() {
      expressions.insert(index.to_string(), Value::String(branch.condition.clone()));
      if branch.condition.trim() == "true" {
        has_else = true;
      }

      let mut branch_ports = vec![stage.port(index)];
      for plugin in &branch.plugins {
        let built = match kind {
          StageKind::Filter => self.filter(plugin, branch_ports.clone(), working_dir)?,
          StageKind::Output => self.output(plugin, branch_ports.clone(), working_dir)?,
          StageKind::Input => {
            return Err(CompileError::InvalidStage {
              stage: stage.name.clone(),
              message: "conditionals are not allowed in the input section".to_string(),
            });
          }
        };
        if kind == StageKind::Filter {
          branch_ports = built.ports;
        }
        prepend(&mut children, built.stages);
      }

      let mut merged = branch_ports;
      merged.append(&mut ports);
      ports = merged;
    }

    if !has_else {
      let index = branches.len();
      expressions.insert(index.to_string(), Value::String("true".to_string()));
      ports.insert(0, stage.port(index));
    }

    stage
      .options
      .insert("expressions".to_string(), Value::Object(expressions));
    Ok((children, ports))
  }

  /// Compile the `pick` sections of another configuration file.
  fn import(&mut self, location: &str, stage: &StageDef, pick: &[StageKind], seed: Vec<Port>) -> Result<Built, CompileError> {
    let content = self.provider.load(location, &stage.working_dir)?;
    if self.imports.contains(&content.location) {
      return Err(CompileError::ImportCycle {
        location: content.location,
      });
    }

    let vars = string_map(stage.options.get("var"));
    let text = substitute_vars(&content.text, &vars);
    let config = sluice_config::parse(&text).map_err(|source| CompileError::Parse {
      location: content.location.clone(),
      source,
    })?;

    debug!(stage = %stage.name, location = %content.location, "configuration_imported");

    self.imports.push(content.location);
    let built = self.sections(&config, &content.working_dir, pick, seed);
    self.imports.pop();
    built
  }

  fn new_stage(&mut self, kind: StageKind, plugin: &Plugin, working_dir: &Path) -> StageDef {
    self.ordinal += 1;

    let mut options = Map::new();
    for setting in &plugin.settings {
      options.insert(setting.key.clone(), setting.value.clone());
    }
    if !plugin.codecs.is_empty() {
      options.insert("codecs".to_string(), codecs_option(plugin));
    }

    let mut stage = StageDef {
      pipeline: self.pipeline.clone(),
      name: String::new(),
      ordinal: self.ordinal,
      label: plugin.label.clone().unwrap_or_else(|| plugin.name.clone()),
      kind,
      plugin: plugin.name.clone(),
      schedule: schedule_option(options.get("interval")),
      trace: trace_option(options.get("trace")),
      pool_size: workers_option(options.get("workers")).unwrap_or(match kind {
        StageKind::Filter => DEFAULT_FILTER_POOL_SIZE,
        _ => DEFAULT_POOL_SIZE,
      }),
      options,
      sources: Vec::new(),
      buffer: DEFAULT_BUFFER,
      working_dir: working_dir.to_path_buf(),
    };
    stage.name = format!("{}_{}-{}", self.pipeline, stage.stage_type(), self.ordinal);
    stage
  }
}

fn prepend(list: &mut Vec<StageDef>, mut front: Vec<StageDef>) {
  front.append(list);
  *list = front;
}

/// The `path` option as a list, normalized in place. `None` when unset.
fn import_paths(stage: &mut StageDef) -> Result<Option<Vec<String>>, CompileError> {
  let paths = match stage.options.get("path") {
    None => return Ok(None),
    Some(Value::String(path)) => vec![path.clone()],
    Some(Value::Array(items)) => items
      .iter()
      .map(|item| match item {
        Value::String(path) => Ok(path.clone()),
        other => Err(CompileError::InvalidStage {
          stage: stage.name.clone(),
          message: format!("path entries must be strings, found {}", other),
        }),
      })
      .collect::<Result<Vec<_>, _>>()?,
    Some(other) => {
      return Err(CompileError::InvalidStage {
        stage: stage.name.clone(),
        message: format!("path must be a string or a list, found {}", other),
      });
    }
  };

  if paths.is_empty() {
    return Err(CompileError::InvalidStage {
      stage: stage.name.clone(),
      message: "path must not be empty".to_string(),
    });
  }

  stage.options.insert(
    "path".to_string(),
    Value::Array(paths.iter().cloned().map(Value::String).collect()),
  );
  Ok(Some(paths))
}

fn codecs_option(plugin: &Plugin) -> Value {
  let codecs = plugin
    .codecs
    .iter()
    .map(|codec| {
      let mut options = Map::new();
      let mut entry = Map::new();
      entry.insert("name".to_string(), Value::String(codec.name.clone()));
      for setting in &codec.settings {
        if setting.key == "role" {
          entry.insert("role".to_string(), setting.value.clone());
        }
        options.insert(setting.key.clone(), setting.value.clone());
      }
      entry.insert("options".to_string(), Value::Object(options));
      Value::Object(entry)
    })
    .collect();
  Value::Array(codecs)
}

/// `interval` as a schedule: integers mean seconds, other text passes through.
fn schedule_option(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::Number(n) => n.as_i64().map(|secs| format!("@every {}s", secs)),
    Value::String(s) => match s.trim().parse::<i64>() {
      Ok(secs) => Some(format!("@every {}s", secs)),
      Err(_) if s.trim().is_empty() => None,
      Err(_) => Some(s.clone()),
    },
    _ => None,
  }
}

fn trace_option(value: Option<&Value>) -> bool {
  match value {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => matches!(s.trim(), "true" | "1"),
    Some(Value::Number(n)) => n.as_i64() == Some(1),
    _ => false,
  }
}

fn workers_option(value: Option<&Value>) -> Option<usize> {
  let workers = match value? {
    Value::Number(n) => n.as_u64()? as usize,
    Value::String(s) => s.trim().parse::<usize>().ok()?,
    _ => return None,
  };
  (workers > 0).then_some(workers)
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
  match value {
    Some(Value::Object(map)) => map
      .iter()
      .map(|(k, v)| {
        let text = match v {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        (k.clone(), text)
      })
      .collect(),
    _ => BTreeMap::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn compile_str(text: &str) -> Vec<StageDef> {
    let config = sluice_config::parse(text).unwrap();
    compile("main", &config, Path::new(".")).unwrap()
  }

  fn by_plugin<'a>(stages: &'a [StageDef], plugin: &str) -> Vec<&'a StageDef> {
    stages.iter().filter(|s| s.plugin == plugin).collect()
  }

  #[test]
  fn test_names_and_defaults() {
    let stages = compile_str("input { generator {} } filter { drop {} } output { null {} }");
    let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
    // newest first
    assert_eq!(
      names,
      vec!["main_output_null-3", "main_filter_drop-2", "main_input_generator-1"]
    );
    assert_eq!(stages[1].pool_size, DEFAULT_FILTER_POOL_SIZE);
    assert_eq!(stages[2].pool_size, DEFAULT_POOL_SIZE);
    assert!(stages.iter().all(|s| s.buffer == DEFAULT_BUFFER));
    assert_eq!(stages[0].sources, vec![Port::new("main_filter_drop-2", 0)]);
    assert_eq!(stages[1].sources, vec![Port::new("main_input_generator-1", 0)]);
    assert!(stages[2].sources.is_empty());
  }

  #[test]
  fn test_interval_workers_trace() {
    let stages = compile_str(
      r#"input {
        generator { interval => 10 workers => 4 }
        generator { interval => "30" }
        generator { interval => "0 */5 * * * *" trace => true }
      }"#,
    );
    let schedules: Vec<Option<&str>> = stages.iter().rev().map(|s| s.schedule.as_deref()).collect();
    assert_eq!(
      schedules,
      vec![Some("@every 10s"), Some("@every 30s"), Some("0 */5 * * * *")]
    );
    assert_eq!(stages[2].pool_size, 4);
    assert!(stages[0].trace);
    assert!(!stages[1].trace);
  }

  #[test]
  fn test_else_branch_is_synthesized() {
    let stages = compile_str(
      r#"input { generator {} }
      filter {
        if [a] { stdout {} }
        else if [b] { drop {} }
      }
      output { null {} }"#,
    );

    let when = by_plugin(&stages, "when")[0];
    assert_eq!(
      when.options.get("expressions"),
      Some(&json!({"0": "[a]", "1": "[b]", "2": "true"}))
    );

    let output = by_plugin(&stages, "null")[0];
    // else port first, then the branches' terminal ports, latest branch first
    assert_eq!(
      output.sources,
      vec![
        when.port(2),
        Port::new(by_plugin(&stages, "drop")[0].name.clone(), 0),
        Port::new(by_plugin(&stages, "stdout")[0].name.clone(), 0),
      ]
    );
  }

  #[test]
  fn test_explicit_else_is_not_duplicated() {
    let stages = compile_str("filter { if [a] { drop {} } else { stdout {} } }");
    let when = by_plugin(&stages, "when")[0];
    assert_eq!(
      when.options.get("expressions"),
      Some(&json!({"0": "[a]", "1": "true"}))
    );
  }

  #[test]
  fn test_branch_chains_and_nesting() {
    let stages = compile_str(
      r#"filter {
        if [a] {
          drop "first" {}
          if [b] { drop "inner" {} }
        }
      }"#,
    );
    let first = stages.iter().find(|s| s.label == "first").unwrap();
    let inner_when = stages.iter().filter(|s| s.plugin == "when").max_by_key(|s| s.ordinal).unwrap();
    let outer_when = stages.iter().filter(|s| s.plugin == "when").min_by_key(|s| s.ordinal).unwrap();
    let inner = stages.iter().find(|s| s.label == "inner").unwrap();

    assert_eq!(first.sources, vec![outer_when.port(0)]);
    assert_eq!(inner_when.sources, vec![first.port(0)]);
    assert_eq!(inner.sources, vec![inner_when.port(0)]);
  }

  #[test]
  fn test_output_branches_are_terminal() {
    let stages = compile_str(
      r#"input { generator {} } output { if [x] == 1 { stdout {} } null {} }"#,
    );
    let when = by_plugin(&stages, "when")[0];
    let stdout = by_plugin(&stages, "stdout")[0];
    let null = by_plugin(&stages, "null")[0];
    assert_eq!(when.kind, StageKind::Output);
    assert_eq!(stdout.sources, vec![when.port(0)]);
    assert_eq!(null.sources, when.sources);
    assert_eq!(
      when.options.get("expressions"),
      Some(&json!({"0": "[x] == 1", "1": "true"}))
    );
  }

  #[test]
  fn test_codecs_are_collected() {
    let stages = compile_str(r#"output { stdout { codec => json { role => "encoder" } } }"#);
    assert_eq!(
      stages[0].options.get("codecs"),
      Some(&json!([{"name": "json", "role": "encoder", "options": {"role": "encoder"}}]))
    );
  }

  #[test]
  fn test_route_without_path_forwards_both_ports() {
    let stages = compile_str("filter { route { condition => \"[a]\" } drop {} }");
    let route = by_plugin(&stages, "route")[0];
    let drop = by_plugin(&stages, "drop")[0];
    assert_eq!(drop.sources, vec![route.port(0), route.port(1)]);
  }

  #[test]
  fn test_conditionals_rejected_in_inputs() {
    let config = sluice_config::parse("input { if [a] { generator {} } }").unwrap();
    let err = compile("main", &config, Path::new(".")).unwrap_err();
    assert!(matches!(err, CompileError::InvalidStage { .. }));
  }
}
