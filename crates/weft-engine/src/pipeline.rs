//! Style Pipeline
//!
//! Composes the processing queue with the rule index: every result's
//! `changes` are written into the live stylesheet in order. A rule that
//! fails to apply is logged and skipped without aborting the others, then
//! retried with the next result unless that result rewrites it.

use weft_css::{ProcessingResult, RuleChange, StyleChange, StyleOverrides};
use weft_cssom::{CssomError, RuleIndex, RuleSheet, StyleSheet};

use crate::config::PipelineConfig;
use crate::processor::{CssProcessor, Deferred};
use crate::PipelineError;

/// A rule the live stylesheet refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub selector: String,
    pub error: CssomError,
}

/// Outcome of applying one result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Rules written to the sheet
    pub applied: usize,
    pub failed: Vec<RuleFailure>,
    /// Advisory diagnostics from the worker
    pub warnings: Vec<String>,
}

impl ApplyReport {
    /// Every rule applied and no warnings
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }
}

/// Editor-session pipeline: one queue, one worker, one live stylesheet
#[derive(Debug)]
pub struct StylePipeline<S: RuleSheet = StyleSheet> {
    processor: CssProcessor,
    rules: RuleIndex<S>,
    /// Rules the sheet refused last time
    retry: Vec<RuleChange>,
}

impl StylePipeline<StyleSheet> {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let processor = CssProcessor::new(config.processor)?;
        Ok(Self::with_parts(processor, RuleIndex::new()))
    }
}

impl<S: RuleSheet> StylePipeline<S> {
    pub fn with_parts(processor: CssProcessor, rules: RuleIndex<S>) -> Self {
        Self {
            processor,
            rules,
            retry: Vec::new(),
        }
    }

    /// Reset the live stylesheet and load a new baseline
    pub async fn initialize(
        &mut self,
        css: impl Into<String>,
        overrides: StyleOverrides,
    ) -> Result<ApplyReport, PipelineError> {
        self.rules.reset();
        self.retry.clear();
        let result = self.processor.initialize(css, overrides).await?;
        Ok(self.apply(&result))
    }

    /// Queue an edit without waiting for it
    pub fn submit(&self, change: StyleChange, overrides: StyleOverrides) -> Deferred {
        self.processor.process_change(change, overrides)
    }

    /// Write every changed rule of `result` into the live stylesheet
    pub fn apply(&mut self, result: &ProcessingResult) -> ApplyReport {
        let mut report = ApplyReport {
            warnings: result.warnings.clone(),
            ..ApplyReport::default()
        };

        let retry: Vec<RuleChange> = std::mem::take(&mut self.retry)
            .into_iter()
            .filter(|old| !result.changes.iter().any(|new| new.selector == old.selector))
            .collect();
        if !retry.is_empty() {
            tracing::debug!("Retrying {} previously refused rules", retry.len());
        }

        for change in retry.iter().chain(&result.changes) {
            let written = match &change.renamed_from {
                Some(from) => self.rules.rename_rule(from, &change.selector, &change.css_text),
                None => self.rules.update_rule(&change.selector, &change.css_text),
            };
            match written {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    tracing::warn!("Failed to apply rule for `{}`: {}", change.selector, error);
                    report.failed.push(RuleFailure {
                        selector: change.selector.clone(),
                        error,
                    });
                    self.retry.push(change.clone());
                }
            }
        }

        for warning in &report.warnings {
            tracing::debug!("Style warning: {}", warning);
        }
        report
    }

    /// Queue an edit, wait for it and apply the result
    pub async fn process(
        &mut self,
        change: StyleChange,
        overrides: StyleOverrides,
    ) -> Result<ApplyReport, PipelineError> {
        match self.submit(change, overrides).await {
            Ok(result) => Ok(self.apply(&result)),
            Err(e) => {
                tracing::warn!("Style change rejected: {}", e);
                Err(e)
            }
        }
    }

    pub fn rules(&self) -> &RuleIndex<S> {
        &self.rules
    }

    pub fn sheet(&self) -> &S {
        self.rules.sheet()
    }

    pub fn processor(&self) -> &CssProcessor {
        &self.processor
    }
}
