mod category;
mod flow;
mod payload;
mod request;
mod response;

pub use category::WasteCategory;
pub use flow::{Flow, FlowRequest, FlowResponse};
pub use payload::ImagePayload;
pub use request::{ClassifyRequest, SummaryRequest};
pub use response::{ClassificationOutput, ProbabilityDistribution, SummaryResult};
