pub mod config;
pub mod error;
pub mod generalizer;
pub mod points;
pub mod session;
pub mod snapshot;
pub mod stub;
pub mod stubgen;
pub mod transformer;
pub mod types;
pub mod workflow;

pub use config::{ApiflowsConfig, ConfigLoader, ConfigValidator};
pub use error::AppError;
pub use points::{Point, RawPoint};
pub use session::{GenerationOutput, GenerationSession, WorkflowHost, WorkflowRunner};
pub use snapshot::{SnapshotFiles, SnapshotWriter};
pub use stub::{ExternalServices, OutboundRequest, ReplayStubs, ResponseSource, StubData};
pub use stubgen::CombinationGenerator;
pub use transformer::{FlowItem, FlowTree, Pipelines};
pub use types::*;
pub use workflow::Workflow;
