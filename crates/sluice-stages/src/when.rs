use async_trait::async_trait;
use serde_json::Value;
use sluice_expr::BranchRouter;
use sluice_packet::Packet;
use sluice_stage::{ConfigError, OptionDoc, Options, Stage, StageContext, StageDoc, StageError};

/// Sends each packet to the port of the first branch whose expression holds.
///
/// Packets matching no branch are dropped: an `else` is only present when
/// the configuration (or the compiler) wrote one.
#[derive(Default)]
pub struct When {
  router: Option<BranchRouter>,
  ctx: Option<StageContext>,
}

/// Branch expressions in port order.
///
/// Accepts a hash keyed by branch index, as the compiler writes it, or a
/// plain list.
fn branches(options: &Options) -> Result<Vec<String>, ConfigError> {
  let Some(value) = options.get("expressions") else {
    return Err(ConfigError::Missing {
      key: "expressions".into(),
    });
  };

  match value {
    Value::Array(_) => options.string_list("expressions"),
    Value::Object(_) => {
      let mut indexed = options
        .string_map("expressions")?
        .into_iter()
        .map(|(k, v)| {
          k.trim()
            .parse::<usize>()
            .map(|i| (i, v))
            .map_err(|_| ConfigError::Invalid {
              key: "expressions".into(),
              message: format!("branch index '{}' is not a number", k),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
      indexed.sort_by_key(|(i, _)| *i);
      for (expected, (i, _)) in indexed.iter().enumerate() {
        if *i != expected {
          return Err(ConfigError::Invalid {
            key: "expressions".into(),
            message: format!("branch {} is missing", expected),
          });
        }
      }
      Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
    other => Err(ConfigError::InvalidType {
      key: "expressions".into(),
      expected: "a hash or a list",
      found: other.to_string(),
    }),
  }
}

#[async_trait]
impl Stage for When {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    self.router = Some(BranchRouter::new(branches(options)?));
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    let (Some(router), Some(ctx)) = (&self.router, &self.ctx) else {
      return Err(StageError::NotConfigured);
    };
    if let Some(port) = router.select(&packet) {
      ctx.send(packet, port).await;
    }
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("when", "Routes each packet to the port of the first matching branch")
      .option(
        OptionDoc::new("expressions", "hash", "Branch expressions keyed by port number")
          .required()
          .example(r#"expressions => { "0" => "[status] >= 500" "1" => "true" }"#),
      )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{drain, options, packet, wired};
  use serde_json::json;

  #[tokio::test]
  async fn test_first_match_wins() {
    let (ctx, mut rx0, mut rx1) = wired("when");
    let mut stage = When::default();
    stage
      .configure(ctx, &options(json!({"expressions": {"1": "true", "0": "[n] > 5"}})))
      .await
      .unwrap();

    stage.receive(packet(json!({"n": 9}))).await.unwrap();
    stage.receive(packet(json!({"n": 1}))).await.unwrap();

    assert_eq!(drain(&mut rx0).len(), 1);
    assert_eq!(drain(&mut rx1)[0].value("n"), Some(&json!(1)));
  }

  #[tokio::test]
  async fn test_no_match_drops() {
    let (ctx, mut rx0, mut rx1) = wired("when");
    let mut stage = When::default();
    stage
      .configure(ctx, &options(json!({"expressions": ["[missing] == 'x'", "[bad] =="]})))
      .await
      .unwrap();

    stage.receive(packet(json!({"n": 1}))).await.unwrap();
    assert!(drain(&mut rx0).is_empty());
    assert!(drain(&mut rx1).is_empty());
  }

  #[tokio::test]
  async fn test_gap_in_branch_indexes_is_rejected() {
    let (ctx, _rx0, _rx1) = wired("when");
    let mut stage = When::default();
    let err = stage
      .configure(ctx, &options(json!({"expressions": {"0": "true", "2": "true"}})))
      .await
      .unwrap_err();
    assert!(matches!(err, StageError::Config(ConfigError::Invalid { .. })));
  }
}
