use serde::{Deserialize, Serialize};
use std::fmt;

/// Steps of a submission, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Hashing,
    Checking,
    Uploading,
    Registering,
    Done,
}

impl Stage {
    /// Progress percentage shown when the stage starts.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Hashing => 25,
            Stage::Checking => 35,
            Stage::Uploading => 55,
            Stage::Registering => 80,
            Stage::Done => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Hashing => "hashing",
            Stage::Checking => "checking",
            Stage::Uploading => "uploading",
            Stage::Registering => "registering",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Receives stage transitions of a running submission.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: Stage);
}

impl<F> StageObserver for F
where
    F: Fn(Stage) + Send + Sync,
{
    fn on_stage(&self, stage: Stage) {
        self(stage)
    }
}
