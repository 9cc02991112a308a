//! Reviewer prompt builder.
//!
//! Templates are compiled into the binary; the system prompt is the base
//! auditor brief plus one overlay per selected focus area.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::chunk::Chunk;
use crate::io::config::FocusArea;

const BASE_PROMPT: &str = include_str!("prompts/base.md");
const SECURITY_OVERLAY: &str = include_str!("prompts/security.md");
const QUALITY_OVERLAY: &str = include_str!("prompts/quality.md");
const COMPLIANCE_OVERLAY: &str = include_str!("prompts/compliance.md");
const PERFORMANCE_OVERLAY: &str = include_str!("prompts/performance.md");
const CHUNK_TEMPLATE: &str = include_str!("prompts/chunk.md");
const RECALIBRATE_TEMPLATE: &str = include_str!("prompts/recalibrate.md");

fn overlay(area: FocusArea) -> &'static str {
    match area {
        FocusArea::Security => SECURITY_OVERLAY,
        FocusArea::Quality => QUALITY_OVERLAY,
        FocusArea::Compliance => COMPLIANCE_OVERLAY,
        FocusArea::Performance => PERFORMANCE_OVERLAY,
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("chunk", CHUNK_TEMPLATE)
            .expect("chunk template should be valid");
        env.add_template("recalibrate", RECALIBRATE_TEMPLATE)
            .expect("recalibrate template should be valid");
        Self { env }
    }

    /// System prompt for the whole session: base brief plus overlays in the
    /// order the focus areas were given.
    pub fn build_system_prompt(&self, focus_areas: &[FocusArea]) -> String {
        let mut prompt = BASE_PROMPT.trim_end().to_string();
        for area in focus_areas {
            prompt.push_str("\n\n");
            prompt.push_str(overlay(*area).trim_end());
        }
        prompt
    }

    pub fn build_chunk_prompt(&self, chunk: &Chunk) -> Result<String> {
        let template = self.env.get_template("chunk")?;
        let rendered = template.render(context! {
            id => chunk.id,
            line_count => chunk.line_count(),
            timestamp => chunk.timestamp.to_rfc3339(),
            tools => (!chunk.detected_tools.is_empty()).then(|| chunk.detected_tools.join(", ")),
            content => chunk.content(),
        })?;
        Ok(rendered)
    }

    pub fn build_recalibration_prompt(&self, worker_response: &str) -> Result<String> {
        let template = self.env.get_template("recalibrate")?;
        let rendered = template.render(context! {
            response => worker_response.trim(),
        })?;
        Ok(rendered)
    }
}
