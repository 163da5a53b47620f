use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

macro_rules! impl_id {
    ($t:ty) => {
        impl $t {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $t {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

impl_id!(RunId);
impl_id!(SessionId);

/// The external text-transform backend a user picked. Interchangeable from the
/// orchestrator's point of view; only forwarded to the transform capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
    DeepSeek,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "open_ai"),
            Provider::DeepSeek => write!(f, "deep_seek"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(Provider::Anthropic),
            "open_ai" | "openai" => Ok(Provider::OpenAi),
            "deep_seek" | "deepseek" => Ok(Provider::DeepSeek),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// What a transform call is asked to do with its input text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    #[default]
    Rewrite,
    Expand,
    Append,
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformMode::Rewrite => write!(f, "rewrite"),
            TransformMode::Expand => write!(f, "expand"),
            TransformMode::Append => write!(f, "append"),
        }
    }
}

impl std::str::FromStr for TransformMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rewrite" => Ok(TransformMode::Rewrite),
            "expand" => Ok(TransformMode::Expand),
            "append" => Ok(TransformMode::Append),
            other => Err(format!("unknown transform mode: {other}")),
        }
    }
}

/// Lifecycle of one orchestration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}
