pub mod config;
pub mod convert;
pub mod db;
pub mod doctor;
pub mod elisp;
pub mod frontmatter;
pub mod links;
pub mod logging;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod protect;
pub mod vault;

pub use config::{Config, ConfigError, LinkTarget};
pub use convert::{ConvertError, ProseConverter};
pub use db::{OrgRoamDatabase, SourceError};
pub use models::{LinkOccurrence, Note, NoteBuilder, NoteId, TargetSpec};
pub use paths::{PathAllocation, StructureError};
pub use pipeline::{MigrationOutcome, MigrationReport, run};
pub use vault::{VaultWriter, write_report};
