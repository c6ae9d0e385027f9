pub mod model;
pub mod status;
pub mod store;

pub use model::{
    Document, DocumentId, GptSettings, NewDocument, ResolvedGptSettings, Structure,
};
pub use status::DocumentStatus;
pub use store::{DocumentStore, LocalFsDocumentStore};
