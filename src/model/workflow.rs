use serde::{Deserialize, Serialize};

use crate::{EvflowError, Result, model::ActivityModel};

/// What the engine does with the rest of an execution once an activity fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorStrategy {
    /// The first failure fails the execution.
    #[default]
    Halt,
    /// Independent branches keep running; the execution fails once everything is settled.
    Continue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowModel {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub desc: String,
    /// Workflow timeout in milliseconds, the engine default when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    pub activities: Vec<ActivityModel>,
}

fn default_version() -> String {
    "1".to_string()
}

impl WorkflowModel {
    pub fn new(
        name: &str,
        version: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let workflow = serde_json::from_str::<WorkflowModel>(s);
        match workflow {
            Ok(v) => Ok(v),
            Err(e) => Err(EvflowError::Workflow(format!("{}", e))),
        }
    }

    pub fn activity(
        mut self,
        activity: ActivityModel,
    ) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn timeout_ms(
        mut self,
        timeout_ms: u64,
    ) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn error_strategy(
        mut self,
        strategy: ErrorStrategy,
    ) -> Self {
        self.error_strategy = strategy;
        self
    }
}

#[cfg(test)]
mod test {
    use crate::model::{ErrorStrategy, WorkflowModel};

    #[test]
    fn test_from_json() {
        let json = r#"
        {
            "name": "order",
            "timeout_ms": 5000,
            "error_strategy": "continue",
            "activities": [
                { "name": "a1", "publish": ["e1"] },
                { "name": "a2", "subscribe": ["e1"] }
            ]
        }
        "#;
        let model = WorkflowModel::from_json(json).unwrap();
        assert_eq!(model.version, "1");
        assert_eq!(model.timeout_ms, Some(5000));
        assert_eq!(model.error_strategy, ErrorStrategy::Continue);
        assert_eq!(model.activities.len(), 2);
        assert_eq!(model.activities[1].subscribe, vec!["e1".to_string()]);
        assert!(model.activities[0].subscribe.is_empty());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(WorkflowModel::from_json("{\"name\": 1}").is_err());
    }
}
