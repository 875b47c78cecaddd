use std::fmt;

use serde_json::Value;

use super::request::{ClassifyRequest, SummaryRequest};
use super::response::{ClassificationOutput, ProbabilityDistribution, SummaryResult};
use crate::history::ClassificationResult;

/// The three prompt/schema pairings the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Classify,
    ClassifyContinuous,
    Summarize,
}

impl Flow {
    pub const ALL: [Flow; 3] = [Flow::Classify, Flow::ClassifyContinuous, Flow::Summarize];

    pub fn name(self) -> &'static str {
        match self {
            Self::Classify => "classifyWaste",
            Self::ClassifyContinuous => "continuouslyClassifyWaste",
            Self::Summarize => "summarizeClassificationHistory",
        }
    }

    /// Model capability the flow needs from the registry.
    pub fn capability(self) -> &'static str {
        match self {
            Self::Classify | Self::ClassifyContinuous => "vision",
            Self::Summarize => "text",
        }
    }

    pub fn takes_image(self) -> bool {
        !matches!(self, Self::Summarize)
    }

    pub fn output_schema(self) -> Value {
        match self {
            Self::Classify => ClassificationOutput::json_schema(),
            Self::ClassifyContinuous => ProbabilityDistribution::json_schema(),
            Self::Summarize => SummaryResult::json_schema(),
        }
    }

    pub fn max_output_tokens(self) -> u64 {
        match self {
            Self::Classify => 400,
            Self::ClassifyContinuous => 120,
            Self::Summarize => 300,
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowRequest {
    Classify(ClassifyRequest),
    ClassifyContinuous(ClassifyRequest),
    Summarize(SummaryRequest),
}

impl FlowRequest {
    pub fn flow(&self) -> Flow {
        match self {
            Self::Classify(_) => Flow::Classify,
            Self::ClassifyContinuous(_) => Flow::ClassifyContinuous,
            Self::Summarize(_) => Flow::Summarize,
        }
    }

    /// Template input, keyed the way the prompt templates reference it.
    pub fn template_input(&self) -> Value {
        match self {
            Self::Classify(request) | Self::ClassifyContinuous(request) => request.to_value(),
            Self::Summarize(request) => request.to_value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResponse {
    Classification(ClassificationResult),
    Distribution(ProbabilityDistribution),
    Summary(SummaryResult),
}

impl FlowResponse {
    pub fn flow(&self) -> Flow {
        match self {
            Self::Classification(_) => Flow::Classify,
            Self::Distribution(_) => Flow::ClassifyContinuous,
            Self::Summary(_) => Flow::Summarize,
        }
    }
}
