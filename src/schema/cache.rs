//! Schema Cache
//!
//! Discovers the project schema once per session. Listing calls fan out
//! across models and explores under a semaphore; results are merged in
//! listing order so the snapshot is deterministic.

use crate::error::{AgentError, Result};
use crate::schema::{explore_key, ExploreDetail, ExploreInfo, Field, ModelInfo, ModelSummary, ProjectSchema};
use crate::tools::SemanticLayer;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

/// Outcome of a discovery call
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub schema: Arc<ProjectSchema>,
    /// Explanation-trace lines produced while discovering
    pub trace: Vec<String>,
    /// One entry per model or explore that was omitted
    pub failures: Vec<String>,
    /// False when the cached snapshot was returned without fetching
    pub fetched: bool,
}

impl DiscoveryReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct SchemaCache {
    layer: Arc<dyn SemanticLayer>,
    concurrency: usize,
    // Holding the lock is the discovery-in-progress guard.
    slot: Mutex<Option<Arc<ProjectSchema>>>,
}

impl SchemaCache {
    pub fn new(layer: Arc<dyn SemanticLayer>, concurrency: usize) -> Self {
        Self {
            layer,
            concurrency: concurrency.max(1),
            slot: Mutex::new(None),
        }
    }

    /// Return the cached schema, discovering it first if needed.
    ///
    /// Concurrent callers wait on the in-flight discovery instead of starting
    /// their own. A failed top-level listing leaves the cache empty; failed
    /// sub-fetches only omit the affected model or explore.
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        let mut slot = self.slot.lock().await;
        if let Some(schema) = slot.as_ref() {
            return Ok(DiscoveryReport {
                schema: Arc::clone(schema),
                trace: vec!["📦 Using cached project schema".to_string()],
                failures: Vec::new(),
                fetched: false,
            });
        }

        let report = self.fetch().await?;
        *slot = Some(Arc::clone(&report.schema));
        Ok(report)
    }

    pub async fn cached(&self) -> Option<Arc<ProjectSchema>> {
        self.slot.lock().await.clone()
    }

    /// Drop the cached schema (explicit session reset only).
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
        info!("Schema cache invalidated");
    }

    async fn fetch(&self) -> Result<DiscoveryReport> {
        let mut trace = vec!["🔍 Discovering project schema...".to_string()];
        let mut failures = Vec::new();
        let permits = Arc::new(Semaphore::new(self.concurrency));

        let models = self
            .layer
            .list_models()
            .await
            .map_err(|e| AgentError::SchemaDiscovery(format!("list_models failed: {}", e)))?;
        if models.is_empty() {
            return Err(AgentError::SchemaDiscovery("No models found".to_string()));
        }
        info!("📊 Found {} models", models.len());
        trace.push(format!("📊 Found {} models", models.len()));

        let explore_listings = join_all(models.iter().map(|model| {
            let permits = Arc::clone(&permits);
            async move {
                limited(&permits, self.layer.list_explores(&model.name)).await
            }
        }))
        .await;

        let mut jobs: Vec<(&ModelInfo, ExploreInfo)> = Vec::new();
        let mut listed_models: Vec<&ModelInfo> = Vec::new();
        for (model, listing) in models.iter().zip(explore_listings) {
            match listing {
                Ok(explores) => {
                    trace.push(format!("  └── Model: {} ({} explores)", model.name, explores.len()));
                    listed_models.push(model);
                    jobs.extend(explores.into_iter().map(|e| (model, e)));
                }
                Err(e) => {
                    warn!("Could not list explores for model {}: {}", model.name, e);
                    trace.push(format!(
                        "⚠️ Skipped model '{}': could not list explores ({})",
                        model.name, e
                    ));
                    failures.push(model.name.clone());
                }
            }
        }

        let field_listings = join_all(jobs.iter().map(|(model, explore)| {
            let permits = Arc::clone(&permits);
            async move {
                let (dimensions, measures) = tokio::join!(
                    limited(&permits, self.layer.list_dimensions(&model.name, &explore.name)),
                    limited(&permits, self.layer.list_measures(&model.name, &explore.name)),
                );
                Ok::<(Vec<Field>, Vec<Field>), AgentError>((dimensions?, measures?))
            }
        }))
        .await;

        let mut schema = ProjectSchema::default();
        for model in &listed_models {
            schema.models.push(ModelSummary {
                name: model.name.clone(),
                label: label_or_name(&model.label, &model.name),
                explores: Vec::new(),
            });
        }

        for ((model, explore), listing) in jobs.iter().zip(field_listings) {
            let key = explore_key(&model.name, &explore.name);
            match listing {
                Ok((dimensions, measures)) => {
                    trace.push(format!(
                        "      └── Explore: {} ({} dimensions, {} measures)",
                        explore.name,
                        dimensions.len(),
                        measures.len()
                    ));
                    let detail = ExploreDetail {
                        model: model.name.clone(),
                        name: explore.name.clone(),
                        label: label_or_name(&explore.label, &explore.name),
                        description: explore.description.clone(),
                        dimensions,
                        measures,
                    };
                    if let Some(summary) = schema.models.iter_mut().find(|m| m.name == model.name) {
                        summary.explores.push(detail.summary());
                    }
                    schema.explores.insert(key, detail);
                }
                Err(e) => {
                    warn!("Could not load fields for explore {}: {}", key, e);
                    trace.push(format!("⚠️ Skipped explore '{}': could not load fields ({})", key, e));
                    failures.push(key);
                }
            }
        }

        if schema.is_empty() && !failures.is_empty() {
            warn!("Every explore was omitted ({} failures)", failures.len());
            trace.push(format!(
                "⚠️ No explores could be loaded ({} failures); continuing with an empty schema",
                failures.len()
            ));
        } else if failures.is_empty() {
            trace.push(format!(
                "✅ Schema discovery complete: {} explores",
                schema.explore_count()
            ));
        } else {
            trace.push(format!(
                "✅ Schema discovery complete with {} omission(s): {} explores loaded",
                failures.len(),
                schema.explore_count()
            ));
        }
        info!(
            "Schema discovery complete: {} explores, {} failures",
            schema.explore_count(),
            failures.len()
        );

        Ok(DiscoveryReport {
            schema: Arc::new(schema),
            trace,
            failures,
            fetched: true,
        })
    }
}

async fn limited<T, F>(permits: &Semaphore, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let _permit = permits
        .acquire()
        .await
        .map_err(|_| AgentError::SchemaDiscovery("discovery worker pool closed".to_string()))?;
    call.await
}

fn label_or_name(label: &str, name: &str) -> String {
    if label.is_empty() {
        name.to_string()
    } else {
        label.to_string()
    }
}
