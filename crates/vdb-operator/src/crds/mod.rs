//! Custom Resource Definitions

pub mod verticadb;

pub use verticadb::{
    CommunalStorage, InitPolicy, KSafety, LocalStorage, Subcluster, VerticaDB, VerticaDBSpec,
};
