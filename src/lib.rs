//! Release publication for Graphviz builds.
//!
//! Runs as the last CI job of a pipeline. It takes the artifacts earlier jobs
//! left in the working tree and:
//!
//! - **Resolves the version** - release vs. development snapshot, and the
//!   `MAJOR.MINOR.PATCH` version the package registry is keyed by
//! - **Scans artifacts** - the two source archives plus the `Packages/` tree,
//!   classified by format and platform
//! - **Uploads** - every artifact (and a SHA-256 sidecar where required) to the
//!   project's generic package registry
//! - **Registers the release** - only for stable versions, via release-cli
//! - **Writes download-page data** - `graphviz-<version>.json`
//!
//! # Architecture
//!
//! ```text
//! release-deploy (bin)
//!     │
//!     ├── preflight: CI marker, release-cli on PATH
//!     ├── version:   ResolvedVersion
//!     └── pipeline:  Deployer
//!             ├── scanner   → artifact (classification)
//!             ├── upload    → Transfer (curl)      ┐
//!             ├── checksum                          ├→ ledger
//!             ├── metadata                          ┘
//!             └── release   → ReleaseRegistrar (release-cli)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use release_deploy::{ArtifactScanner, CurlTransfer, Deployer, Logger};
//! use release_deploy::{RegistryEndpoint, ReleaseCli, ResolvedVersion, Uploader};
//! use std::path::Path;
//!
//! let logger = Logger::detached();
//! let version = ResolvedVersion::resolve("2.50.0", None)?;
//! let mut deployer = Deployer::new(
//!     ArtifactScanner::new(Path::new("."), Path::new("Packages"), &logger),
//!     Uploader::new(endpoint, CurlTransfer::new("curl", token), &logger),
//!     ReleaseCli::new("release-cli", &logger),
//!     &logger,
//! );
//! deployer.run(&version)?;
//! ```

pub mod artifact;
pub mod checksum;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod release;
pub mod scanner;
pub mod upload;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{classify_artifact, Artifact, Classification, Platform};
pub use config::{CiContext, DeployArgs};
pub use ledger::{AssetLedger, UploadedAsset};
pub use logging::Logger;
pub use metadata::{ReleaseMetadata, ReleaseMetadataBuilder, WebDownloadEntry};
pub use pipeline::{DeployOutcome, Deployer, PipelineState};
pub use release::{ReleaseCli, ReleaseRegistrar, ReleaseRequest};
pub use scanner::ArtifactScanner;
pub use upload::{CurlTransfer, RegistryEndpoint, Transfer, UploadError, Uploader};
pub use version::ResolvedVersion;
