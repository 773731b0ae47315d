use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityModel {
    pub name: String,
    #[serde(default)]
    pub desc: String,

    /// Events that must all arrive before the activity runs.
    #[serde(default)]
    pub subscribe: Vec<String>,

    /// Events the activity is allowed to publish.
    #[serde(default)]
    pub publish: Vec<String>,
}

impl ActivityModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn subscribe(
        mut self,
        event: &str,
    ) -> Self {
        self.subscribe.push(event.to_string());
        self
    }

    pub fn publish(
        mut self,
        event: &str,
    ) -> Self {
        self.publish.push(event.to_string());
        self
    }
}
