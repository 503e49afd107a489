// SPDX-License-Identifier: MIT

//! Contract between stages and the host flow executor

use serde::Serialize;

/// What the executor decided after a stage ran
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageResponse {
    /// Advance to the next stage
    Continue,
    /// Current stage is invalid; the flow halts
    Invalid { message: Option<String> },
}

/// Callbacks a stage uses to hand control back to the flow executor
pub trait StageExecutor {
    /// Mark the current stage as passed
    fn stage_ok(&mut self) -> StageResponse;

    /// Mark the current stage invalid and stop forward progress
    fn stage_invalid(&mut self, message: Option<String>) -> StageResponse;
}

/// Executor that only records and logs decisions
///
/// Used by the CLI and tests where no real flow is running.
#[derive(Debug, Default)]
pub struct LoggingExecutor {
    pub responses: Vec<StageResponse>,
}

impl LoggingExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StageExecutor for LoggingExecutor {
    fn stage_ok(&mut self) -> StageResponse {
        log::info!("Stage passed, continuing flow");
        let response = StageResponse::Continue;
        self.responses.push(response.clone());
        response
    }

    fn stage_invalid(&mut self, message: Option<String>) -> StageResponse {
        log::info!(
            "Stage invalid, halting flow: {}",
            message.as_deref().unwrap_or("<no message>")
        );
        let response = StageResponse::Invalid { message };
        self.responses.push(response.clone());
        response
    }
}
