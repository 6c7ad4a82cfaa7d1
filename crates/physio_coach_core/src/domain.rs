//! crates/physio_coach_core/src/domain.rs
//!
//! Defines the core data structures for the application: the exercise plan as
//! produced by the generation model, the generic node tree the narrator walks,
//! and the annotated plan returned to the caller.

use crate::error::{CoachError, CoachResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// Suffix of the sibling field that carries a field's narrated audio.
pub const AUDIO_SUFFIX: &str = "_audio";

//=========================================================================================
// Generic Plan Tree
//=========================================================================================

/// A JSON-like tree with ordered mappings.
///
/// Mapping entries keep their insertion order, so step order and the placement
/// of `<key>_audio` siblings survive serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Mapping(Vec<(String, PlanNode)>),
    List(Vec<PlanNode>),
    Text(String),
    /// Numbers, booleans and nulls.
    Other(Value),
}

impl PlanNode {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => PlanNode::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, PlanNode::from_value(value)))
                    .collect(),
            ),
            Value::Array(items) => {
                PlanNode::List(items.into_iter().map(PlanNode::from_value).collect())
            }
            Value::String(text) => PlanNode::Text(text),
            other => PlanNode::Other(other),
        }
    }

    /// Converts back into a `serde_json::Value`. Mapping order is not kept.
    pub fn into_value(self) -> Value {
        match self {
            PlanNode::Mapping(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, node)| (key, node.into_value()))
                    .collect::<Map<String, Value>>(),
            ),
            PlanNode::List(items) => {
                Value::Array(items.into_iter().map(PlanNode::into_value).collect())
            }
            PlanNode::Text(text) => Value::String(text),
            PlanNode::Other(value) => value,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PlanNode::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Looks up a direct child of a mapping.
    pub fn get(&self, key: &str) -> Option<&PlanNode> {
        match self {
            PlanNode::Mapping(entries) => entries
                .iter()
                .find(|(candidate, _)| candidate == key)
                .map(|(_, node)| node),
            _ => None,
        }
    }

    /// Follows a dotted path such as `steps.2.description`. Numeric segments
    /// index into lists.
    pub fn lookup(&self, path: &str) -> Option<&PlanNode> {
        path.split('.').try_fold(self, |node, segment| match node {
            PlanNode::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => node.get(segment),
        })
    }
}

impl Serialize for PlanNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PlanNode::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, node) in entries {
                    map.serialize_entry(key, node)?;
                }
                map.end()
            }
            PlanNode::List(items) => serializer.collect_seq(items),
            PlanNode::Text(text) => serializer.serialize_str(text),
            PlanNode::Other(value) => value.serialize(serializer),
        }
    }
}

//=========================================================================================
// Exercise Plan
//=========================================================================================

/// One instruction unit of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// 1-based position within the plan.
    pub position: u32,
    pub action: String,
    pub description: String,
    /// Fields the model added beyond `action` and `description`.
    pub extras: Vec<(String, PlanNode)>,
}

/// The structured plan produced by the generation model.
/// Built once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExercisePlan {
    pub exercise: String,
    pub intro: String,
    /// Ordered by `position`.
    pub steps: Vec<Step>,
    pub outro: String,
    pub extras: Vec<(String, PlanNode)>,
}

impl ExercisePlan {
    /// Validates decoded model output against the exercise plan shape.
    ///
    /// `steps` may be a mapping keyed by positive integers or an array. Unknown
    /// fields are kept as extras; fields ending in `_audio` are rejected because
    /// that suffix is reserved for narration output.
    pub fn from_json(value: Value) -> CoachResult<Self> {
        let Value::Object(mut root) = value else {
            return Err(shape_error("the plan must be a JSON object"));
        };

        let exercise = take_text(&mut root, "exercise", "")?;
        let intro = take_text(&mut root, "intro", "")?;
        let outro = take_text(&mut root, "outro", "")?;
        let steps_value = root
            .remove("steps")
            .ok_or_else(|| shape_error("missing field `steps`"))?;
        let steps = parse_steps(steps_value)?;
        let extras = collect_extras(root, "")?;

        Ok(Self {
            exercise,
            intro,
            steps,
            outro,
            extras,
        })
    }

    /// Renders the plan as a node tree: `exercise`, `intro`, `steps` (keyed by
    /// position, in order), `outro`, then any extras.
    pub fn to_node(&self) -> PlanNode {
        let steps = self
            .steps
            .iter()
            .map(|step| {
                let mut fields = vec![
                    ("action".to_string(), PlanNode::Text(step.action.clone())),
                    (
                        "description".to_string(),
                        PlanNode::Text(step.description.clone()),
                    ),
                ];
                fields.extend(step.extras.iter().cloned());
                (step.position.to_string(), PlanNode::Mapping(fields))
            })
            .collect();

        let mut entries = vec![
            ("exercise".to_string(), PlanNode::Text(self.exercise.clone())),
            ("intro".to_string(), PlanNode::Text(self.intro.clone())),
            ("steps".to_string(), PlanNode::Mapping(steps)),
            ("outro".to_string(), PlanNode::Text(self.outro.clone())),
        ];
        entries.extend(self.extras.iter().cloned());
        PlanNode::Mapping(entries)
    }
}

fn shape_error(detail: impl Into<String>) -> CoachError {
    CoachError::InvalidPlanShape(detail.into())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn take_text(object: &mut Map<String, Value>, key: &str, prefix: &str) -> CoachResult<String> {
    let path = join_path(prefix, key);
    match object.remove(key) {
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(shape_error(format!("`{path}` must be a string"))),
        None => Err(shape_error(format!("missing field `{path}`"))),
    }
}

fn collect_extras(object: Map<String, Value>, prefix: &str) -> CoachResult<Vec<(String, PlanNode)>> {
    object
        .into_iter()
        .map(|(key, value)| {
            let path = join_path(prefix, &key);
            reject_reserved_key(&key, &path)?;
            reject_reserved_keys(&value, &path)?;
            Ok((key, PlanNode::from_value(value)))
        })
        .collect()
}

fn reject_reserved_key(key: &str, path: &str) -> CoachResult<()> {
    if key.ends_with(AUDIO_SUFFIX) {
        return Err(shape_error(format!(
            "`{path}` uses the reserved `{AUDIO_SUFFIX}` suffix"
        )));
    }
    Ok(())
}

/// Walks every mapping below `value`, list elements included (0-based index
/// segments), and fails on the first key ending in the audio suffix.
fn reject_reserved_keys(value: &Value, path: &str) -> CoachResult<()> {
    match value {
        Value::Object(map) => map.iter().try_for_each(|(key, child)| {
            let child_path = join_path(path, key);
            reject_reserved_key(key, &child_path)?;
            reject_reserved_keys(child, &child_path)
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| reject_reserved_keys(item, &join_path(path, &index.to_string()))),
        _ => Ok(()),
    }
}

fn parse_steps(value: Value) -> CoachResult<Vec<Step>> {
    let numbered: Vec<(u32, Value)> = match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, step)| match key.trim().parse::<u32>() {
                Ok(position) if position > 0 => Ok((position, step)),
                _ => Err(shape_error(format!(
                    "step key `steps.{key}` is not a positive integer"
                ))),
            })
            .collect::<CoachResult<_>>()?,
        Value::Array(items) => items
            .into_iter()
            .zip(1u32..)
            .map(|(step, position)| (position, step))
            .collect(),
        _ => return Err(shape_error("`steps` must be a mapping or a list")),
    };

    if numbered.is_empty() {
        return Err(shape_error("`steps` must contain at least one step"));
    }

    let mut steps = numbered
        .into_iter()
        .map(|(position, value)| parse_step(position, value))
        .collect::<CoachResult<Vec<_>>>()?;
    steps.sort_by_key(|step| step.position);

    if let Some(pair) = steps.windows(2).find(|pair| pair[0].position == pair[1].position) {
        return Err(shape_error(format!(
            "step position {} appears more than once",
            pair[0].position
        )));
    }
    Ok(steps)
}

fn parse_step(position: u32, value: Value) -> CoachResult<Step> {
    let prefix = format!("steps.{position}");
    let Value::Object(mut fields) = value else {
        return Err(shape_error(format!("`{prefix}` must be a mapping")));
    };
    let action = take_text(&mut fields, "action", &prefix)?;
    let description = take_text(&mut fields, "description", &prefix)?;
    let extras = collect_extras(fields, &prefix)?;
    Ok(Step {
        position,
        action,
        description,
        extras,
    })
}

//=========================================================================================
// Annotated Plan
//=========================================================================================

/// An exercise plan in which every narrated text field has a base64 encoded
/// `<field>_audio` sibling. Serializes as the bare tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedPlan {
    root: PlanNode,
}

impl AnnotatedPlan {
    pub fn new(root: PlanNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    pub fn into_node(self) -> PlanNode {
        self.root
    }

    pub fn lookup(&self, path: &str) -> Option<&PlanNode> {
        self.root.lookup(path)
    }
}

impl Serialize for AnnotatedPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}
