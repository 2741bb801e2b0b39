//! Predictor - sweeps every dataset pair and keeps the resulting links
//!
//! Per pair, sequentially:
//! 1. single-column candidates, scored and gated
//! 2. composite candidates for multi-column keys, gated on accuracy; a key
//!    with no passing assignment keeps only its best one
//! 3. composite links supersede the single-column links they contain
//! 4. validation, then cardinality classification into canonical orientation
//! 5. one link per endpoint set
//!
//! Pairs run concurrently on tokio tasks, bounded by `max_concurrency`.

use crate::analysis::DatasetAnalyzer;
use crate::candidate::{CandidateGenerator, CandidatePair};
use crate::cardinality;
use crate::config::PredictorConfig;
use crate::dataset::Dataset;
use crate::dtype::DtypeFilter;
use crate::error::{LinkError, Result};
use crate::intersection::IntersectionProvider;
use crate::link::{PredictedLink, Relationship};
use crate::persistence;
use crate::scorer::{LinkScorer, ScoredCandidate};
use crate::validator::{LinkValidator, ValidationRequest, ValidatorBackend};
use dashmap::DashMap;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dataset names of a pair, sorted.
type PairKey = (String, String);

fn pair_key(a: &str, b: &str) -> PairKey {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub struct Predictor {
    /// Sorted by name; pairs are always compared in this order
    datasets: BTreeMap<String, Arc<Dataset>>,
    provider: Arc<dyn IntersectionProvider>,
    config: PredictorConfig,
    validator: Option<Arc<dyn ValidatorBackend>>,
    analyzer: Option<Arc<dyn DatasetAnalyzer>>,
    results: Arc<DashMap<PairKey, Vec<PredictedLink>>>,
}

impl Predictor {
    pub fn new(
        datasets: Vec<Dataset>,
        provider: Arc<dyn IntersectionProvider>,
        config: PredictorConfig,
    ) -> Result<Self> {
        if datasets.len() < 2 {
            return Err(LinkError::InsufficientDatasets(datasets.len()));
        }
        config.validate()?;

        let mut by_name = BTreeMap::new();
        for dataset in datasets {
            let name = dataset.name().to_string();
            if by_name.insert(name.clone(), Arc::new(dataset)).is_some() {
                return Err(LinkError::DuplicateDataset(name));
            }
        }

        Ok(Self {
            datasets: by_name,
            provider,
            config,
            validator: None,
            analyzer: None,
            results: Arc::new(DashMap::new()),
        })
    }

    /// Judge accepted candidates with `backend` before keeping them.
    pub fn with_validator(mut self, backend: Arc<dyn ValidatorBackend>) -> Self {
        self.validator = Some(backend);
        self
    }

    /// Run `analyzer` on datasets whose prerequisite analysis is incomplete.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn DatasetAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values().map(|d| d.as_ref())
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name).map(|d| d.as_ref())
    }

    pub async fn predict(&mut self, force_recreate: bool) -> Result<Vec<PredictedLink>> {
        self.predict_with_cancel(force_recreate, CancellationToken::new()).await
    }

    /// Like [`predict`](Self::predict); cancelling `token` stops queued and
    /// in-flight pairs. Pairs finished before that stay stored.
    pub async fn predict_with_cancel(
        &mut self,
        force_recreate: bool,
        token: CancellationToken,
    ) -> Result<Vec<PredictedLink>> {
        let missing = self.ensure_prerequisites().await;

        let ready: Vec<Arc<Dataset>> = self
            .datasets
            .values()
            .filter(|d| d.is_analyzed())
            .cloned()
            .collect();
        let pairs: Vec<(Arc<Dataset>, Arc<Dataset>)> = ready.into_iter().tuple_combinations().collect();
        let pair_keys: Vec<PairKey> = pairs.iter().map(|(a, b)| pair_key(a.name(), b.name())).collect();

        let worker = Arc::new(self.worker());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut handles = Vec::new();
        let mut reused = 0usize;

        for ((a, b), key) in pairs.into_iter().zip(pair_keys.iter().cloned()) {
            if !force_recreate && self.results.contains_key(&key) {
                reused += 1;
                continue;
            }
            let worker = Arc::clone(&worker);
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&self.results);
            let token = token.clone();

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => return false,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return false,
                    },
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    links = worker.compare(&a, &b) => {
                        results.insert(key, links);
                        true
                    }
                }
            }));
        }

        let scheduled = handles.len();
        let mut completed = 0usize;
        for handle in handles {
            match handle.await {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(e) => warn!("Pair comparison task failed: {}", e),
            }
        }

        info!(
            pairs = pair_keys.len(),
            compared = completed,
            reused,
            "Link prediction sweep finished"
        );

        if token.is_cancelled() && completed < scheduled {
            return Err(LinkError::Cancelled {
                completed_pairs: completed,
            });
        }
        if let Some((dataset, reason)) = missing.into_iter().next() {
            return Err(LinkError::PrerequisiteMissing { dataset, reason });
        }

        Ok(pair_keys
            .iter()
            .filter_map(|key| self.results.get(key).map(|links| links.value().clone()))
            .flatten()
            .collect())
    }

    /// Analyze incomplete datasets where possible. Returns the ones still
    /// missing prerequisites with the reason.
    async fn ensure_prerequisites(&mut self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        let incomplete: Vec<(String, Arc<Dataset>)> = self
            .datasets
            .iter()
            .filter(|(_, d)| !d.is_analyzed())
            .map(|(name, d)| (name.clone(), Arc::clone(d)))
            .collect();

        for (name, dataset) in incomplete {
            let reason = dataset
                .missing_prerequisite()
                .unwrap_or("analysis incomplete")
                .to_string();
            let analyzer = match &self.analyzer {
                Some(analyzer) => Arc::clone(analyzer),
                None => {
                    warn!(dataset = %name, %reason, "Skipping dataset with missing prerequisites");
                    missing.push((name, reason));
                    continue;
                }
            };

            match analyzer.analyze(&dataset).await {
                Ok(analyzed) if analyzed.is_analyzed() => {
                    info!(dataset = %name, "Ran prerequisite analysis");
                    self.datasets.insert(name, Arc::new(analyzed));
                }
                Ok(analyzed) => {
                    let reason = analyzed.missing_prerequisite().unwrap_or("analysis incomplete");
                    warn!(dataset = %name, %reason, "Analysis left prerequisites missing");
                    missing.push((name, reason.to_string()));
                }
                Err(e) => {
                    warn!(dataset = %name, "Prerequisite analysis failed: {}", e);
                    missing.push((name, e.to_string()));
                }
            }
        }
        missing
    }

    fn worker(&self) -> PairWorker {
        PairWorker {
            generator: CandidateGenerator::new(
                DtypeFilter::new(self.config.remove_datetime_candidates),
                self.config.max_composite_candidates,
            ),
            scorer: LinkScorer::new(
                Arc::clone(&self.provider),
                self.config.uniqueness_threshold,
                self.config.intersect_timeout(),
            ),
            validator: LinkValidator::new(
                self.validator.clone(),
                self.config.max_retries,
                self.config.validation_timeout(),
                self.config.retry.clone(),
            ),
            cardinality_threshold: self.config.cardinality_threshold,
        }
    }

    /// Every stored link, grouped by dataset pair in name order.
    pub fn links(&self) -> Vec<PredictedLink> {
        let mut keys: Vec<PairKey> = self.results.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys.iter()
            .filter_map(|key| self.results.get(key).map(|links| links.value().clone()))
            .flatten()
            .collect()
    }

    /// Links between `a` and `b`, in either direction.
    pub fn get_link(&self, a: &str, b: &str) -> Vec<PredictedLink> {
        self.results
            .get(&pair_key(a, b))
            .map(|links| links.value().clone())
            .unwrap_or_default()
    }

    pub fn links_for(&self, dataset: &str) -> Vec<PredictedLink> {
        self.links().into_iter().filter(|l| l.involves(dataset)).collect()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.links()
            .iter()
            .map(|l| l.relationship_with(self.config.cardinality_threshold))
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persistence::save_links(path, &self.links(), self.config.cardinality_threshold)
    }

    /// Load links saved earlier. They replace stored results for the pairs
    /// they cover and are reused by `predict(false)`. Returns the link count.
    pub fn load(&self, path: &Path) -> Result<usize> {
        let links = persistence::load_links(path)?;
        let count = links.len();

        let mut grouped: HashMap<PairKey, Vec<PredictedLink>> = HashMap::new();
        for link in links {
            grouped
                .entry(pair_key(&link.from_dataset, &link.to_dataset))
                .or_default()
                .push(link);
        }
        for (key, links) in grouped {
            self.results.insert(key, links);
        }

        info!(path = %path.display(), links = count, "Loaded links");
        Ok(count)
    }
}

/// Everything one pair comparison needs, shared by all worker tasks.
struct PairWorker {
    generator: CandidateGenerator,
    scorer: LinkScorer,
    validator: LinkValidator,
    cardinality_threshold: f64,
}

impl PairWorker {
    async fn compare(&self, a: &Dataset, b: &Dataset) -> Vec<PredictedLink> {
        let singles = self.generator.single_column(a, b);
        let accepted_singles = self.scorer.score_accepted(a, b, &singles).await;

        let partners: Vec<CandidatePair> = accepted_singles.iter().map(|s| s.candidate.clone()).collect();
        let composites = self.generator.composite(a, b, &partners);
        let accepted_composites = self.scorer.score_composites(a, b, &composites).await;

        let accepted_single_count = accepted_singles.len();
        let mut accepted: Vec<ScoredCandidate> = accepted_singles
            .into_iter()
            .filter(|s| !accepted_composites.iter().any(|c| c.candidate.covers(&s.candidate)))
            .collect();
        let superseded = accepted_single_count - accepted.len();
        accepted.extend(accepted_composites);

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        let mut rejected = 0usize;
        for scored in &accepted {
            let request = ValidationRequest {
                scored,
                dataset_a: a,
                dataset_b: b,
            };
            let outcome = self.validator.run(&request).await;
            if !outcome.keeps_link() {
                rejected += 1;
                continue;
            }
            let link = self.to_link(scored, outcome.low_confidence());
            if seen.insert(link.endpoint_key()) {
                links.push(link);
            }
        }

        info!(
            from = %a.name(),
            to = %b.name(),
            candidates = singles.len() + composites.len(),
            superseded,
            rejected,
            links = links.len(),
            "Compared dataset pair"
        );
        links
    }

    /// Classify and store in canonical orientation; ratios follow their side.
    fn to_link(&self, scored: &ScoredCandidate, low_confidence: bool) -> PredictedLink {
        let candidate = &scored.candidate;
        let classification = cardinality::classify(
            &candidate.dataset_a,
            &candidate.columns_a,
            &candidate.dataset_b,
            &candidate.columns_b,
            scored.from_uniqueness_ratio,
            scored.to_uniqueness_ratio,
            self.cardinality_threshold,
        );
        debug!(
            source = %classification.source_table,
            target = %classification.target_table,
            kind = %classification.kind,
            swapped = classification.swapped,
            "Classified link"
        );

        let (ratio_from, ratio_to, uniq_from, uniq_to) = if classification.swapped {
            (
                scored.intersect_ratio_to_col,
                scored.intersect_ratio_from_col,
                scored.to_uniqueness_ratio,
                scored.from_uniqueness_ratio,
            )
        } else {
            (
                scored.intersect_ratio_from_col,
                scored.intersect_ratio_to_col,
                scored.from_uniqueness_ratio,
                scored.to_uniqueness_ratio,
            )
        };

        PredictedLink {
            from_dataset: classification.source_table,
            from_columns: classification.source_columns,
            to_dataset: classification.target_table,
            to_columns: classification.target_columns,
            intersect_count: scored.intersect_count,
            intersect_ratio_from_col: ratio_from,
            intersect_ratio_to_col: ratio_to,
            accuracy: scored.accuracy,
            from_uniqueness_ratio: uniq_from,
            to_uniqueness_ratio: uniq_to,
            low_confidence,
        }
    }
}
