//! Validated, immutable workflow graph.
//!
//! Activities and events form a bipartite directed graph: a publish edge
//! runs from an activity to an event, a subscribe edge from an event to an
//! activity. The graph is checked once at deploy time and never mutated.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    time::Duration,
};

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};

use crate::{
    EvflowError, Result,
    model::{ErrorStrategy, WorkflowModel},
    store::data::ExecutionEntity,
    utils,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Vertex {
    Activity(String),
    Event(String),
}

impl Vertex {
    fn name(&self) -> &str {
        match self {
            Vertex::Activity(name) | Vertex::Event(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    version: String,
    desc: String,
    timeout: Duration,
    error_strategy: ErrorStrategy,

    /// Activity names in topological order.
    activities: Vec<String>,
    subscriptions: HashMap<String, BTreeSet<String>>,
    publications: HashMap<String, BTreeSet<String>>,
    /// event -> the single activity publishing it
    publishers: HashMap<String, String>,
    /// event -> activities subscribing to it
    subscribers: HashMap<String, Vec<String>>,
}

impl WorkflowDefinition {
    /// Validates `model` and builds its graph. `default_timeout` applies when
    /// the model declares none.
    pub fn build(
        model: &WorkflowModel,
        default_timeout: Duration,
    ) -> Result<Self> {
        if model.name.is_empty() {
            return Err(EvflowError::Workflow("workflow name is empty".to_string()));
        }
        if model.version.is_empty() {
            return Err(EvflowError::Workflow(format!("workflow {} has an empty version", model.name)));
        }
        if model.activities.is_empty() {
            return Err(EvflowError::Workflow(format!("workflow {} has no activity", model.name)));
        }

        let mut graph = DiGraph::<Vertex, ()>::new();
        let mut activity_nodes: HashMap<String, NodeIndex> = HashMap::new();
        let mut event_nodes: HashMap<String, NodeIndex> = HashMap::new();
        let mut subscriptions = HashMap::new();
        let mut publications = HashMap::new();
        let mut publishers: HashMap<String, String> = HashMap::new();
        let mut subscribers: HashMap<String, Vec<String>> = HashMap::new();

        for activity in model.activities.iter() {
            if activity.name.is_empty() {
                return Err(EvflowError::Workflow(format!("workflow {} has an activity without name", model.name)));
            }
            if activity_nodes.contains_key(&activity.name) {
                return Err(EvflowError::Workflow(format!("activity {} is declared twice", activity.name)));
            }
            let idx = graph.add_node(Vertex::Activity(activity.name.clone()));
            activity_nodes.insert(activity.name.clone(), idx);
        }

        let mut event_node = |graph: &mut DiGraph<Vertex, ()>, event: &str| -> Result<NodeIndex> {
            if event.is_empty() {
                return Err(EvflowError::Workflow(format!("workflow {} uses an event without name", model.name)));
            }
            Ok(*event_nodes.entry(event.to_string()).or_insert_with(|| graph.add_node(Vertex::Event(event.to_string()))))
        };

        for activity in model.activities.iter() {
            let aidx = activity_nodes[&activity.name];

            let publish: BTreeSet<String> = activity.publish.iter().cloned().collect();
            for event in publish.iter() {
                if let Some(other) = publishers.get(event) {
                    return Err(EvflowError::Workflow(format!("event {} is published by both {} and {}", event, other, activity.name)));
                }
                let eidx = event_node(&mut graph, event)?;
                graph.add_edge(aidx, eidx, ());
                publishers.insert(event.clone(), activity.name.clone());
            }

            let subscribe: BTreeSet<String> = activity.subscribe.iter().cloned().collect();
            for event in subscribe.iter() {
                let eidx = event_node(&mut graph, event)?;
                graph.add_edge(eidx, aidx, ());
                subscribers.entry(event.clone()).or_default().push(activity.name.clone());
            }

            subscriptions.insert(activity.name.clone(), subscribe);
            publications.insert(activity.name.clone(), publish);
        }

        for (event, activities) in subscribers.iter() {
            if !publishers.contains_key(event) {
                return Err(EvflowError::Workflow(format!("event {} subscribed by {} is never published", event, activities.join(", "))));
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| EvflowError::Workflow(format!("workflow {} has a cycle through {}", model.name, graph[cycle.node_id()].name())))?;
        let activities: Vec<String> = order
            .into_iter()
            .filter_map(|idx| match &graph[idx] {
                Vertex::Activity(name) => Some(name.clone()),
                Vertex::Event(_) => None,
            })
            .collect();

        let definition = Self {
            name: model.name.clone(),
            version: model.version.clone(),
            desc: model.desc.clone(),
            timeout: model.timeout_ms.map(Duration::from_millis).unwrap_or(default_timeout),
            error_strategy: model.error_strategy,
            activities,
            subscriptions,
            publications,
            publishers,
            subscribers,
        };
        if definition.entry_activities().is_empty() {
            return Err(EvflowError::Workflow(format!("workflow {} has no entry activity", model.name)));
        }
        Ok(definition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Registry key, `name@version`.
    pub fn key(&self) -> String {
        utils::definition_key(&self.name, &self.version)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether `other` has the same key, settings and graph. Descriptions and
    /// declaration order are ignored.
    pub fn is_equivalent(
        &self,
        other: &WorkflowDefinition,
    ) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.timeout == other.timeout
            && self.error_strategy == other.error_strategy
            && self.subscriptions == other.subscriptions
            && self.publications == other.publications
    }

    pub fn error_strategy(&self) -> ErrorStrategy {
        self.error_strategy
    }

    /// Every activity, publishers before their subscribers.
    pub fn activities(&self) -> &[String] {
        &self.activities
    }

    pub fn contains(
        &self,
        activity: &str,
    ) -> bool {
        self.subscriptions.contains_key(activity)
    }

    /// Activities without subscriptions, started directly by the engine.
    pub fn entry_activities(&self) -> Vec<String> {
        self.activities.iter().filter(|a| self.subscriptions.get(*a).is_some_and(|s| s.is_empty())).cloned().collect()
    }

    /// Events `activity` waits for. Empty for unknown activities.
    pub fn subscriptions(
        &self,
        activity: &str,
    ) -> BTreeSet<String> {
        self.subscriptions.get(activity).cloned().unwrap_or_default()
    }

    /// Events `activity` may publish.
    pub fn publications(
        &self,
        activity: &str,
    ) -> BTreeSet<String> {
        self.publications.get(activity).cloned().unwrap_or_default()
    }

    pub fn publisher(
        &self,
        event: &str,
    ) -> Option<&str> {
        self.publishers.get(event).map(String::as_str)
    }

    /// Activities subscribing to `event`.
    pub fn subscribers(
        &self,
        event: &str,
    ) -> &[String] {
        self.subscribers.get(event).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether every activity of `execution` has completed, failed or can
    /// never run.
    ///
    /// An activity can never run once one of its inputs comes from an
    /// activity that failed, can never run, or completed without publishing
    /// that input.
    pub fn is_settled(
        &self,
        execution: &ExecutionEntity,
    ) -> bool {
        let mut dead: HashSet<&str> = HashSet::new();
        for activity in self.activities.iter() {
            if execution.is_completed(activity) {
                continue;
            }
            if execution.is_failed(activity) {
                dead.insert(activity);
                continue;
            }
            let blocked = self.subscriptions[activity].iter().any(|event| match self.publishers.get(event) {
                Some(publisher) => dead.contains(publisher.as_str()) || (execution.is_completed(publisher) && !execution.has_published(event)),
                None => true,
            });
            if !blocked {
                return false;
            }
            dead.insert(activity);
        }
        true
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        events::{ErrorInfo, ErrorKind, WorkflowExecutionInfo},
        model::{ActivityModel, ErrorStrategy, WorkflowModel},
        store::data::{ActivityFailure, ExecutionEntity},
        workflow::WorkflowDefinition,
    };

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn chain() -> WorkflowModel {
        WorkflowModel::new("chain", "1")
            .activity(ActivityModel::new("a3").subscribe("e2"))
            .activity(ActivityModel::new("a2").subscribe("e1").publish("e2"))
            .activity(ActivityModel::new("a1").publish("e1"))
    }

    #[test]
    fn test_equivalence_ignores_declaration_order() {
        let def = WorkflowDefinition::build(&chain(), TIMEOUT).unwrap();
        let reordered = WorkflowModel::new("chain", "1")
            .activity(ActivityModel::new("a1").publish("e1"))
            .activity(ActivityModel::new("a2").subscribe("e1").publish("e2"))
            .activity(ActivityModel::new("a3").subscribe("e2"));
        assert!(def.is_equivalent(&WorkflowDefinition::build(&reordered, TIMEOUT).unwrap()));

        let rewired = chain().activity(ActivityModel::new("a0").publish("e0"));
        assert!(!def.is_equivalent(&WorkflowDefinition::build(&rewired, TIMEOUT).unwrap()));
        assert!(!def.is_equivalent(&WorkflowDefinition::build(&chain().timeout_ms(250), TIMEOUT).unwrap()));
    }

    fn branches() -> WorkflowModel {
        WorkflowModel::new("branches", "1")
            .error_strategy(ErrorStrategy::Continue)
            .activity(ActivityModel::new("start").publish("left").publish("right"))
            .activity(ActivityModel::new("l").subscribe("left").publish("l_done"))
            .activity(ActivityModel::new("r").subscribe("right").publish("r_done"))
            .activity(ActivityModel::new("after_l").subscribe("l_done"))
            .activity(ActivityModel::new("after_r").subscribe("r_done"))
    }

    fn execution() -> ExecutionEntity {
        ExecutionEntity::new(&WorkflowExecutionInfo::new("branches", "1", "p"), None)
    }

    fn complete(
        execution: &mut ExecutionEntity,
        activity: &str,
        events: &[&str],
    ) {
        execution.completed_activities.push(activity.to_string());
        execution.published_events.extend(events.iter().map(|e| e.to_string()));
    }

    #[test]
    fn test_build_chain() {
        let def = WorkflowDefinition::build(&chain(), TIMEOUT).unwrap();
        assert_eq!(def.key(), "chain@1");
        assert_eq!(def.activities(), ["a1", "a2", "a3"]);
        assert_eq!(def.entry_activities(), vec!["a1".to_string()]);
        assert_eq!(def.subscribers("e1"), ["a2"]);
        assert_eq!(def.publisher("e2"), Some("a2"));
        assert!(def.subscribers("nope").is_empty());
        assert_eq!(def.timeout(), TIMEOUT);
        assert_eq!(def.error_strategy(), ErrorStrategy::Halt);
    }

    #[test]
    fn test_model_timeout_overrides_default() {
        let def = WorkflowDefinition::build(&chain().timeout_ms(250), TIMEOUT).unwrap();
        assert_eq!(def.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_join_subscriptions() {
        let model = WorkflowModel::new("join", "1")
            .activity(ActivityModel::new("a1").publish("e1"))
            .activity(ActivityModel::new("a2").publish("e2"))
            .activity(ActivityModel::new("a3").subscribe("e1").subscribe("e2").subscribe("e1"));
        let def = WorkflowDefinition::build(&model, TIMEOUT).unwrap();
        assert_eq!(def.subscriptions("a3").len(), 2);
        assert_eq!(def.entry_activities().len(), 2);
    }

    #[test]
    fn test_rejects_cycle() {
        let model = WorkflowModel::new("cycle", "1")
            .activity(ActivityModel::new("start").publish("go"))
            .activity(ActivityModel::new("a").subscribe("go").subscribe("from_b").publish("from_a"))
            .activity(ActivityModel::new("b").subscribe("from_a").publish("from_b"));
        let err = WorkflowDefinition::build(&model, TIMEOUT).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_rejects_self_subscription() {
        let model = WorkflowModel::new("self", "1")
            .activity(ActivityModel::new("start").publish("go"))
            .activity(ActivityModel::new("a").subscribe("go").subscribe("again").publish("again"));
        assert!(WorkflowDefinition::build(&model, TIMEOUT).is_err());
    }

    #[test]
    fn test_rejects_unpublished_subscription() {
        let model = WorkflowModel::new("dangling", "1")
            .activity(ActivityModel::new("a1").publish("e1"))
            .activity(ActivityModel::new("a2").subscribe("e9"));
        let err = WorkflowDefinition::build(&model, TIMEOUT).unwrap_err();
        assert!(err.to_string().contains("never published"));
    }

    #[test]
    fn test_rejects_duplicate_publisher() {
        let model = WorkflowModel::new("dup", "1")
            .activity(ActivityModel::new("a1").publish("e1"))
            .activity(ActivityModel::new("a2").publish("e1"));
        assert!(WorkflowDefinition::build(&model, TIMEOUT).is_err());
    }

    #[test]
    fn test_rejects_duplicate_activity() {
        let model = WorkflowModel::new("dup", "1").activity(ActivityModel::new("a1")).activity(ActivityModel::new("a1"));
        assert!(WorkflowDefinition::build(&model, TIMEOUT).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(WorkflowDefinition::build(&WorkflowModel::new("empty", "1"), TIMEOUT).is_err());
        assert!(WorkflowDefinition::build(&WorkflowModel::new("", "1").activity(ActivityModel::new("a1")), TIMEOUT).is_err());
    }

    #[test]
    fn test_settled_after_all_complete() {
        let def = WorkflowDefinition::build(&branches(), TIMEOUT).unwrap();
        let mut execution = execution();
        assert!(!def.is_settled(&execution));
        complete(&mut execution, "start", &["left", "right"]);
        complete(&mut execution, "l", &["l_done"]);
        complete(&mut execution, "r", &["r_done"]);
        complete(&mut execution, "after_l", &[]);
        assert!(!def.is_settled(&execution));
        complete(&mut execution, "after_r", &[]);
        assert!(def.is_settled(&execution));
    }

    #[test]
    fn test_settled_skips_branch_not_taken() {
        let def = WorkflowDefinition::build(&branches(), TIMEOUT).unwrap();
        let mut execution = execution();
        complete(&mut execution, "start", &["left"]);
        assert!(!def.is_settled(&execution));
        complete(&mut execution, "l", &["l_done"]);
        complete(&mut execution, "after_l", &[]);
        assert!(def.is_settled(&execution));
    }

    #[test]
    fn test_settled_skips_downstream_of_failure() {
        let def = WorkflowDefinition::build(&branches(), TIMEOUT).unwrap();
        let mut execution = execution();
        complete(&mut execution, "start", &["left", "right"]);
        execution.failures.push(ActivityFailure {
            activity: "l".to_string(),
            error: ErrorInfo::new(ErrorKind::ActivityFailed, "boom", Some("l")),
        });
        assert!(!def.is_settled(&execution));
        complete(&mut execution, "r", &["r_done"]);
        complete(&mut execution, "after_r", &[]);
        assert!(def.is_settled(&execution));
    }
}
