pub mod read_artifact;
pub mod register_unit;
pub mod report_hash;
pub mod verify_artifact;

pub use read_artifact::{
    ArtifactSource, ReadArtifactOperation, ReadArtifactOperationOutcome,
    ReadArtifactOperationRequest, ReadArtifactOperationResult,
};
pub use register_unit::{
    RegisterUnitOperation, RegisterUnitOperationRequest, RegisterUnitOperationResult,
};
pub use report_hash::{ReportHashOperation, ReportHashOperationOutcome};
pub use verify_artifact::{
    QuorumSettings, RoundPhase, VerifyArtifactOperation, VerifyArtifactOperationOutcome,
    VerifyArtifactOperationRequest,
};
