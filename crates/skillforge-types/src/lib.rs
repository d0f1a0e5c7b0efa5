//! Shared data model and error currency for the SkillForge workspace.
//!
//! Every other crate path-depends on this one; it holds no I/O and no
//! business logic, only the types that cross crate boundaries.

mod error;
mod invocation;
mod session;
mod skill;

pub use error::{Error, Result};
pub use invocation::{
    InvocationEvent, InvocationStatus, DEFAULT_RETENTION_DAYS, PARAMS_EXCERPT_MAX_BYTES,
};
pub use session::{Capabilities, ClientInfo, PendingNotification, Session, SessionState};
pub use skill::{
    validate_skill_id, FileEntry, Skill, SkillFiles, SkillManifest, SkillMetadata, SkillStatus,
};
