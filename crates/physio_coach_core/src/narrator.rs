//! crates/physio_coach_core/src/narrator.rs
//!
//! The payload narrator walks a plan tree and attaches synthesized speech, as
//! base64 encoded audio, next to every text field that is not exempt.

use crate::domain::{AnnotatedPlan, ExercisePlan, PlanNode, AUDIO_SUFFIX};
use crate::error::{CoachError, CoachResult};
use crate::ports::{PortError, PortResult, TextToSpeechService};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::BytesMut;
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fields that are copied through without narration.
pub const DEFAULT_EXEMPT_FIELDS: &[&str] = &["exercise", "action"];

#[derive(Debug, Clone)]
pub struct NarratorOptions {
    /// Bound on one synthesis call, including reading all of its chunks.
    pub timeout: Duration,
    /// How many synthesis calls may be in flight at once.
    pub concurrency: usize,
    pub exempt_fields: HashSet<String>,
}

impl Default for NarratorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            concurrency: 4,
            exempt_fields: DEFAULT_EXEMPT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A text field waiting for audio.
struct NarrationJob {
    field_path: String,
    text: String,
}

#[derive(Clone)]
pub struct Narrator {
    tts: Arc<dyn TextToSpeechService>,
    options: NarratorOptions,
}

impl Narrator {
    pub fn new(tts: Arc<dyn TextToSpeechService>, options: NarratorOptions) -> Self {
        Self { tts, options }
    }

    pub async fn narrate(&self, plan: &ExercisePlan) -> CoachResult<AnnotatedPlan> {
        let root = self.narrate_node(plan.to_node()).await?;
        Ok(AnnotatedPlan::new(root))
    }

    /// Narrates an arbitrary tree.
    ///
    /// Synthesis runs with bounded concurrency, results are re-joined in
    /// traversal order. The first failure aborts the whole walk and drops any
    /// calls still in flight.
    pub async fn narrate_node(&self, root: PlanNode) -> CoachResult<PlanNode> {
        let mut jobs = Vec::new();
        self.collect_jobs(&root, "", &mut jobs);
        info!(fields = jobs.len(), "Narrating plan.");

        let audio: Vec<String> = stream::iter(jobs)
            .map(|job| self.narrate_field(job))
            .buffered(self.options.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(self.annotate(root, &mut audio.into_iter()))
    }

    fn is_exempt(&self, key: &str) -> bool {
        self.options.exempt_fields.contains(key)
    }

    /// Lists the narratable fields, with their dotted paths, in traversal order.
    fn collect_jobs(&self, node: &PlanNode, path: &str, jobs: &mut Vec<NarrationJob>) {
        match node {
            PlanNode::Mapping(entries) => {
                for (key, child) in entries {
                    let child_path = join_path(path, key);
                    match child {
                        PlanNode::Text(text) if !self.is_exempt(key) => jobs.push(NarrationJob {
                            field_path: child_path,
                            text: text.clone(),
                        }),
                        other => self.collect_jobs(other, &child_path, jobs),
                    }
                }
            }
            PlanNode::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.collect_jobs(item, &join_path(path, &index.to_string()), jobs);
                }
            }
            PlanNode::Text(_) | PlanNode::Other(_) => {}
        }
    }

    /// Rebuilds the tree, taking one audio sibling per narratable field in
    /// the order `collect_jobs` listed them.
    fn annotate(&self, node: PlanNode, audio: &mut impl Iterator<Item = String>) -> PlanNode {
        match node {
            PlanNode::Mapping(entries) => {
                let mut annotated = Vec::with_capacity(entries.len());
                for (key, child) in entries {
                    match child {
                        PlanNode::Text(text) if !self.is_exempt(&key) => {
                            let sibling = format!("{key}{AUDIO_SUFFIX}");
                            let encoded = audio
                                .next()
                                .map(PlanNode::Text)
                                .unwrap_or(PlanNode::Other(Value::Null));
                            annotated.push((key, PlanNode::Text(text)));
                            annotated.push((sibling, encoded));
                        }
                        other => {
                            let child = self.annotate(other, audio);
                            annotated.push((key, child));
                        }
                    }
                }
                PlanNode::Mapping(annotated)
            }
            PlanNode::List(items) => PlanNode::List(
                items
                    .into_iter()
                    .map(|item| self.annotate(item, audio))
                    .collect(),
            ),
            leaf => leaf,
        }
    }

    async fn narrate_field(&self, job: NarrationJob) -> CoachResult<String> {
        let NarrationJob { field_path, text } = job;
        let outcome = tokio::time::timeout(self.options.timeout, self.synthesize(&text)).await;
        let cause = match outcome {
            Ok(Ok(audio)) => {
                debug!(field = %field_path, bytes = audio.len(), "Narrated field.");
                return Ok(BASE64.encode(&audio));
            }
            Ok(Err(cause)) => cause,
            Err(_) => PortError::Timeout(format!(
                "speech synthesis exceeded {:?}",
                self.options.timeout
            )),
        };
        warn!(field = %field_path, error = %cause, "Narration failed.");
        Err(CoachError::NarrationFailed { field_path, cause })
    }

    /// Reads every chunk into one buffer. The buffer lives inside this future,
    /// so an error or a dropped request releases it.
    async fn synthesize(&self, text: &str) -> PortResult<BytesMut> {
        let mut chunks = self.tts.synthesize(text).await?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            buffer.extend_from_slice(&chunk);
        }
        if buffer.is_empty() {
            return Err(PortError::EmptyAudio);
        }
        Ok(buffer)
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
