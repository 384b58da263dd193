use serde::Serialize;
use serde_json::{Value, json};

/// Self-description of a stage, listed by the `plugins` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDoc {
  pub name: String,
  pub description: String,
  pub options: Vec<OptionDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDoc {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub description: String,
  pub required: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub example: Option<String>,
}

impl StageDoc {
  pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
      options: Vec::new(),
    }
  }

  pub fn option(mut self, option: OptionDoc) -> Self {
    self.options.push(option);
    self
  }

  /// Append the options every stage accepts.
  pub fn with_common_options(self) -> Self {
    self
      .option(OptionDoc::new("add_field", "hash", "Fields added to each emitted packet").default(json!({})))
      .option(OptionDoc::new("add_tag", "array", "Tags added to each emitted packet").default(json!([])))
      .option(OptionDoc::new("type", "string", "Sets the type field when absent"))
      .option(OptionDoc::new("remove_field", "array", "Fields removed from each emitted packet").default(json!([])))
      .option(OptionDoc::new("remove_tag", "array", "Tags removed from each emitted packet").default(json!([])))
  }
}

impl OptionDoc {
  pub fn new(name: impl Into<String>, kind: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: kind.into(),
      description: description.into(),
      required: false,
      default: None,
      example: None,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn default(mut self, value: Value) -> Self {
    self.default = Some(value);
    self
  }

  pub fn example(mut self, example: impl Into<String>) -> Self {
    self.example = Some(example.into());
    self
  }
}
