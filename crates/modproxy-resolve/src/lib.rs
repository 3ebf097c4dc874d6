//! Local module resolution.
//!
//! A [`ModuleResolver`] answers module-proxy queries from the local
//! toolchain. Every call produces a [`ResolutionOutcome`]; callers fall back
//! to an upstream registry on [`ResolutionOutcome::ResolutionError`] and give
//! up on [`ResolutionOutcome::Timeout`].

mod classify;
mod error;
mod go;
mod model;

use async_trait::async_trait;

pub use error::ResolveError;
pub use go::GoResolver;
pub use model::{
    ModuleCoordinate, QueryKind, Resolution, ResolutionOutcome, ResolvedModuleInfo, VersionList,
};

#[async_trait]
pub trait ModuleResolver: Send + Sync + std::fmt::Debug {
    async fn resolve(
        &self,
        kind: QueryKind,
        coordinate: &ModuleCoordinate,
    ) -> Result<ResolutionOutcome, ResolveError>;
}
