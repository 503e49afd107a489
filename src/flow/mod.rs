// SPDX-License-Identifier: MIT

pub mod deny;
pub mod loader;
pub mod stage;
pub mod types;

pub use deny::{DenyStage, DEFAULT_DENY_MESSAGE, DENY_EXPRESSION};
pub use stage::{LoggingExecutor, StageExecutor, StageResponse};
