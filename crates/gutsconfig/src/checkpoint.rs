use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a checkpoint selects the place where execution pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    /// Pause when a specific intercepted entry point is called.
    #[default]
    Function,
}

/// Closed set of intercepted Vulkan entry points a checkpoint can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum CheckpointFunction {
    CreateInstance,
    CreateDevice,
    CreateShaderModule,
    CreateShadersExt,
    CreateGraphicsPipelines,
    CreateComputePipelines,
    CmdBindPipeline,
    #[default]
    AcquireNextImage,
    QueuePresent,
}

impl CheckpointFunction {
    pub const ALL: [CheckpointFunction; 9] = [
        CheckpointFunction::CreateInstance,
        CheckpointFunction::CreateDevice,
        CheckpointFunction::CreateShaderModule,
        CheckpointFunction::CreateShadersExt,
        CheckpointFunction::CreateGraphicsPipelines,
        CheckpointFunction::CreateComputePipelines,
        CheckpointFunction::CmdBindPipeline,
        CheckpointFunction::AcquireNextImage,
        CheckpointFunction::QueuePresent,
    ];

    /// Vulkan entry point name, e.g. `vkQueuePresentKHR`.
    pub fn entry_point(self) -> &'static str {
        match self {
            CheckpointFunction::CreateInstance => "vkCreateInstance",
            CheckpointFunction::CreateDevice => "vkCreateDevice",
            CheckpointFunction::CreateShaderModule => "vkCreateShaderModule",
            CheckpointFunction::CreateShadersExt => "vkCreateShadersEXT",
            CheckpointFunction::CreateGraphicsPipelines => "vkCreateGraphicsPipelines",
            CheckpointFunction::CreateComputePipelines => "vkCreateComputePipelines",
            CheckpointFunction::CmdBindPipeline => "vkCmdBindPipeline",
            CheckpointFunction::AcquireNextImage => "vkAcquireNextImageKHR",
            CheckpointFunction::QueuePresent => "vkQueuePresentKHR",
        }
    }
}

impl fmt::Display for CheckpointFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

impl FromStr for CheckpointFunction {
    type Err = String;

    /// Accepts the entry point name with or without the `vk` prefix,
    /// ignoring ASCII case.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("checkpoint function must not be empty".to_string());
        }

        CheckpointFunction::ALL
            .into_iter()
            .find(|function| {
                let name = function.entry_point();
                name.eq_ignore_ascii_case(trimmed) || name[2..].eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| {
                format!(
                    "unknown checkpoint function '{trimmed}'; expected one of {}",
                    CheckpointFunction::ALL
                        .iter()
                        .map(|f| f.entry_point())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

impl TryFrom<String> for CheckpointFunction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CheckpointFunction> for String {
    fn from(value: CheckpointFunction) -> Self {
        value.entry_point().to_string()
    }
}
