//! Reasoning capture for tool-augmented answers.
//!
//! The tool loop reports each tool it picks and each result it gets back.
//! The capture keeps them as ordered steps and renders them for the user.
//! It is pure bookkeeping: dropping it changes nothing about the answer.

use carwise_core::text::truncate_chars;
use serde::{Deserialize, Serialize};

/// One tool invocation and what came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based, strictly increasing
    pub sequence: u32,
    pub tool_name: String,
    pub tool_input: String,
    /// The model's text alongside the tool call, if any
    pub rationale: String,
    /// Truncated tool output; `None` while the result is pending
    pub output: Option<String>,
    pub success: Option<bool>,
}

impl ReasoningStep {
    fn is_pending(&self) -> bool {
        self.output.is_none()
    }
}

/// The finished, read-only list of steps from one agent attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    steps: Vec<ReasoningStep>,
}

impl ReasoningTrace {
    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn used_tool(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.tool_name == name)
    }

    /// Text block per step. Empty string when nothing was recorded.
    pub fn render(&self) -> String {
        if self.steps.is_empty() {
            return String::new();
        }

        let mut out = String::from("## Reasoning\n");
        for step in &self.steps {
            out.push_str(&format!("\n### Step {}: {}\n", step.sequence, step.tool_name));
            if !step.rationale.trim().is_empty() {
                out.push_str(&format!("Thought: {}\n", step.rationale.trim()));
            }
            out.push_str(&format!("Input: {}\n", step.tool_input));
            match (&step.output, step.success) {
                (Some(output), Some(false)) => out.push_str(&format!("Error: {output}\n")),
                (Some(output), _) => out.push_str(&format!("Output: {output}\n")),
                (None, _) => out.push_str("Output: (no result)\n"),
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningCapture {
    steps: Vec<ReasoningStep>,
    output_chars: usize,
}

impl ReasoningCapture {
    /// `output_chars` bounds each stored tool output.
    pub fn new(output_chars: usize) -> Self {
        Self {
            steps: Vec::new(),
            output_chars,
        }
    }

    pub fn on_tool_selected(&mut self, tool_name: &str, tool_input: &str, rationale: &str) {
        let sequence = self.steps.len() as u32 + 1;
        self.steps.push(ReasoningStep {
            sequence,
            tool_name: tool_name.to_string(),
            tool_input: tool_input.to_string(),
            rationale: rationale.to_string(),
            output: None,
            success: None,
        });
    }

    /// Attach a result to the latest step still waiting for one.
    /// No-op when nothing is pending.
    pub fn on_tool_result(&mut self, output: &str, success: bool) {
        let Some(step) = self.steps.iter_mut().rev().find(|s| s.is_pending()) else {
            return;
        };
        step.output = Some(truncate_chars(output, self.output_chars));
        step.success = Some(success);
    }

    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn render(&self) -> String {
        ReasoningTrace {
            steps: self.steps.clone(),
        }
        .render()
    }

    pub fn into_trace(self) -> ReasoningTrace {
        ReasoningTrace { steps: self.steps }
    }
}

impl Default for ReasoningCapture {
    fn default() -> Self {
        Self::new(300)
    }
}
