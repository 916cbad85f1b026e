//! Framework detection per scan root.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::EngineConfig;
use crate::scanner::ScanRoot;

use super::probes::{entry_rank, probe_content};
use super::scoring::{aggregate_confidence, ScoringTable};
use super::{Framework, FrameworkDetection, Language, Signal, SignalKind};

/// Detections for one root, split by the acceptance threshold.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub accepted: Vec<FrameworkDetection>,
    /// Below-threshold guesses; never reported
    pub ambiguous: Vec<FrameworkDetection>,
}

impl DetectionOutcome {
    pub fn frameworks(&self) -> Vec<Framework> {
        self.accepted.iter().map(|d| d.framework).collect()
    }
}

#[derive(Debug, Clone)]
pub struct FrameworkDetector {
    scoring: ScoringTable,
    threshold: f64,
    probe_file_limit: usize,
    max_file_bytes: u64,
}

impl FrameworkDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scoring: config.scoring.clone(),
            threshold: config.detection_threshold,
            probe_file_limit: config.probe_file_limit,
            max_file_bytes: config.max_file_bytes,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn detect(&self, root: &ScanRoot) -> DetectionOutcome {
        let mut signals: BTreeMap<Framework, Vec<Signal>> = BTreeMap::new();

        self.collect_dependency_signals(root, &mut signals);
        self.collect_structural_signals(root, &mut signals);
        self.collect_probe_signals(root, &mut signals);

        let mut outcome = DetectionOutcome::default();
        for (framework, signals) in signals {
            let detection = FrameworkDetection {
                root: root.path.clone(),
                framework,
                confidence: aggregate_confidence(&signals),
                signals,
            };
            if detection.confidence >= self.threshold {
                debug!(
                    "Detected {} in {} (confidence {:.2})",
                    framework,
                    root.path.display(),
                    detection.confidence
                );
                outcome.accepted.push(detection);
            } else {
                debug!(
                    "Ambiguous {} in {} (confidence {:.2} < {:.2})",
                    framework,
                    root.path.display(),
                    detection.confidence,
                    self.threshold
                );
                outcome.ambiguous.push(detection);
            }
        }
        outcome
    }

    fn collect_dependency_signals(
        &self,
        root: &ScanRoot,
        signals: &mut BTreeMap<Framework, Vec<Signal>>,
    ) {
        let weight = self.scoring.weight(SignalKind::Dependency);
        for info in &root.descriptors {
            for framework in Framework::all() {
                for (ecosystem, name) in framework.dependency_markers() {
                    if info.ecosystem == *ecosystem && info.has(name) {
                        signals.entry(*framework).or_default().push(Signal::new(
                            SignalKind::Dependency,
                            *name,
                            weight,
                            PathBuf::from(&info.manifest_path),
                        ));
                    }
                }
            }
        }
    }

    fn collect_structural_signals(
        &self,
        root: &ScanRoot,
        signals: &mut BTreeMap<Framework, Vec<Signal>>,
    ) {
        let languages = languages_present(root);
        for framework in Framework::all() {
            // Markers alone are weak evidence in a root with no code of that language
            if !languages.contains(&framework.language()) {
                continue;
            }
            for (marker, kind) in framework.structural_markers() {
                let path = root.path.join(marker);
                let present = match kind {
                    SignalKind::Directory => path.is_dir(),
                    _ => path.is_file(),
                };
                if present {
                    signals.entry(*framework).or_default().push(Signal::new(
                        *kind,
                        *marker,
                        self.scoring.weight(*kind),
                        path,
                    ));
                }
            }
        }
    }

    fn collect_probe_signals(
        &self,
        root: &ScanRoot,
        signals: &mut BTreeMap<Framework, Vec<Signal>>,
    ) {
        let weight = self.scoring.weight(SignalKind::CodePattern);
        let mut candidates: Vec<&PathBuf> = root.files.iter().collect();
        candidates.sort_by(|a, b| {
            entry_rank(root.relative(a))
                .cmp(&entry_rank(root.relative(b)))
                .then_with(|| a.cmp(b))
        });

        let mut found: HashSet<Framework> = HashSet::new();
        for file in candidates.into_iter().take(self.probe_file_limit) {
            let Some(language) = file
                .extension()
                .and_then(|e| e.to_str())
                .and_then(Language::for_extension)
            else {
                continue;
            };
            let pending: Vec<Framework> = Framework::all()
                .iter()
                .copied()
                .filter(|f| f.language() == language && !found.contains(f))
                .collect();
            if pending.is_empty() {
                continue;
            }
            let Some(content) = read_capped(file, self.max_file_bytes) else {
                continue;
            };
            for framework in pending {
                if let Some(idiom) = probe_content(framework, &content) {
                    found.insert(framework);
                    signals.entry(framework).or_default().push(Signal::new(
                        SignalKind::CodePattern,
                        idiom,
                        weight,
                        file.clone(),
                    ));
                }
            }
        }
    }
}

fn languages_present(root: &ScanRoot) -> HashSet<Language> {
    root.files
        .iter()
        .filter_map(|f| f.extension().and_then(|e| e.to_str()))
        .filter_map(Language::for_extension)
        .collect()
}

fn read_capped(path: &Path, max_bytes: u64) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut buf = Vec::new();
    file.take(max_bytes).read_to_end(&mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}
