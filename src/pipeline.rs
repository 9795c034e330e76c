//! The deploy pipeline.
//!
//! ```text
//! Init → VersionResolved → ArtifactsScanned → LedgerValidated
//!      → ReleaseCreated | SkippedNonRelease → Done
//! ```
//!
//! Any failure moves the pipeline to `Aborted`. There is no recovery: assets
//! already uploaded stay in the registry and a re-run overwrites them under
//! the same names.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Span;

use crate::artifact::Artifact;
use crate::checksum::{checksum_named, CHECKSUM_SUFFIX};
use crate::ledger::AssetLedger;
use crate::logging::Logger;
use crate::metadata::{ReleaseMetadataBuilder, WebDownloadEntry};
use crate::process::propagated_exit_code;
use crate::release::{ReleaseRegistrar, ReleaseRequest};
use crate::scanner::{normalize_permissions, ArtifactScanner};
use crate::upload::{Transfer, UploadError, Uploader};
use crate::version::ResolvedVersion;

/// Exit status for precondition and invariant failures (-1 as a byte).
pub const FAILURE_EXIT_CODE: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    VersionResolved,
    ArtifactsScanned,
    LedgerValidated,
    ReleaseCreated,
    SkippedNonRelease,
    Done,
    Aborted,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Release registered and metadata written to `metadata_path`.
    Released {
        assets: usize,
        metadata_path: PathBuf,
    },
    /// Development snapshot; nothing was registered.
    Skipped { assets: usize },
}

pub struct Deployer<T, R> {
    scanner: ArtifactScanner,
    uploader: Uploader<T>,
    registrar: R,
    ledger: AssetLedger,
    state: PipelineState,
    span: Span,
}

impl<T: Transfer, R: ReleaseRegistrar> Deployer<T, R> {
    pub fn new(
        scanner: ArtifactScanner,
        uploader: Uploader<T>,
        registrar: R,
        logger: &Logger,
    ) -> Self {
        Self {
            scanner,
            uploader,
            registrar,
            ledger: AssetLedger::new(),
            state: PipelineState::Init,
            span: logger.component("pipeline"),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    pub fn uploader(&self) -> &Uploader<T> {
        &self.uploader
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Run every stage, leaving the pipeline `Done` or `Aborted`.
    pub fn run(&mut self, version: &ResolvedVersion) -> Result<DeployOutcome> {
        match self.run_stages(version) {
            Ok(outcome) => {
                self.advance(PipelineState::Done);
                Ok(outcome)
            }
            Err(err) => {
                self.advance(PipelineState::Aborted);
                Err(err)
            }
        }
    }

    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(parent: &self.span, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run_stages(&mut self, version: &ResolvedVersion) -> Result<DeployOutcome> {
        tracing::info!(parent: &self.span, "Graphviz version == {}", version.release);
        tracing::info!(
            parent: &self.span,
            "using generic package version {}",
            version.package
        );
        let mut web = ReleaseMetadataBuilder::new(version)?;
        self.advance(PipelineState::VersionResolved);

        // snapshots still compute every URL but never touch the registry
        let dry_run = !version.is_real_release;

        for archive in self.scanner.source_archives(&version.release)? {
            let entry = self.publish(dry_run, version, &archive)?;
            web.add_source(entry);
        }

        for package in self.scanner.package_artifacts()? {
            normalize_permissions(&package.path)?;
            let mut entry = self.publish(dry_run, version, &package)?;
            entry.bits = package.classification.bits;
            if package.web_windows {
                web.add_windows(entry);
            }
        }
        self.advance(PipelineState::ArtifactsScanned);

        self.ledger.validate()?;
        web.ensure_windows()?;
        self.advance(PipelineState::LedgerValidated);

        let assets = self.ledger.count();
        if !version.is_real_release {
            tracing::warn!(
                parent: &self.span,
                "skipping release creation because {} is not of the form \\d+.\\d+.\\d+",
                version.release
            );
            self.advance(PipelineState::SkippedNonRelease);
            return Ok(DeployOutcome::Skipped { assets });
        }

        let request = ReleaseRequest::new(&version.release, self.ledger.assets());
        self.registrar
            .create_release(&request)
            .with_context(|| format!("creating release {}", version.release))?;
        self.advance(PipelineState::ReleaseCreated);

        let metadata_path = web.write(self.scanner.root())?;
        tracing::info!(
            parent: &self.span,
            "dumping {:?} to {}",
            web.metadata(),
            metadata_path.display()
        );

        Ok(DeployOutcome::Released {
            assets,
            metadata_path,
        })
    }

    /// Upload an artifact and, where required, its checksum sidecar.
    fn publish(
        &mut self,
        dry_run: bool,
        version: &ResolvedVersion,
        artifact: &Artifact,
    ) -> Result<WebDownloadEntry> {
        let name = artifact.upload_name();
        let url = self
            .uploader
            .upload(dry_run, &version.package, &artifact.path, Some(name.as_str()))?;
        self.ledger.accrue(url.clone());
        let mut entry = WebDownloadEntry::new(artifact.format.clone(), url);

        if artifact.needs_checksum {
            tracing::info!(parent: &self.span, "SHA256 summing {}", artifact.display.display());
            let sidecar = checksum_named(&artifact.path, &artifact.display)?;
            let sidecar_name = format!("{name}{CHECKSUM_SUFFIX}");
            let url = self
                .uploader
                .upload(dry_run, &version.package, &sidecar, Some(sidecar_name.as_str()))?;
            self.ledger.accrue(url.clone());
            entry.sha256 = Some(url);
        }

        Ok(entry)
    }
}

/// Process exit status for a failed run.
///
/// A failing subordinate command's own status is passed through; every other
/// failure maps to [`FAILURE_EXIT_CODE`].
pub fn failure_exit_code(err: &anyhow::Error) -> u8 {
    let transfer_code = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<UploadError>())
        .and_then(UploadError::exit_code);
    transfer_code
        .or_else(|| propagated_exit_code(err))
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(FAILURE_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MAX_VIEWABLE_ASSETS;
    use crate::metadata::ReleaseMetadata;
    use crate::testing::{FakeRegistrar, FakeTransfer};
    use crate::process::Cmd;
    use crate::upload::RegistryEndpoint;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";
    const WEB_EXE: &str = "Packages/windows/10/cmake/Release/app.exe";

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel.as_bytes()).unwrap();
        path
    }

    fn tree(version: &str, packages: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), &format!("graphviz-{version}.tar.gz"));
        touch(tmp.path(), &format!("graphviz-{version}.tar.xz"));
        for rel in packages {
            touch(tmp.path(), rel);
        }
        tmp
    }

    fn deployer(
        root: &Path,
        transfer: FakeTransfer,
        registrar: FakeRegistrar,
    ) -> Deployer<FakeTransfer, FakeRegistrar> {
        let logger = Logger::detached();
        let endpoint = RegistryEndpoint {
            api_url: "https://gitlab.example.com/api/v4".to_string(),
            project_id: "1".to_string(),
        };
        Deployer::new(
            ArtifactScanner::new(root, Path::new("Packages"), &logger),
            Uploader::new(endpoint, transfer, &logger),
            registrar,
            &logger,
        )
    }

    fn release(v: &str) -> ResolvedVersion {
        ResolvedVersion::resolve(v, Some(SHA)).unwrap()
    }

    #[test]
    fn test_release_with_single_windows_installer() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());

        let outcome = d.run(&release("2.50.0")).unwrap();
        assert_eq!(d.state(), PipelineState::Done);

        // 2 archives + 2 sidecars + installer + its sidecar
        assert_eq!(d.ledger().count(), 6);
        assert_eq!(d.uploader().transfer().calls().len(), 6);

        let DeployOutcome::Released { metadata_path, .. } = outcome else {
            panic!("expected a release");
        };
        let metadata: ReleaseMetadata =
            serde_json::from_str(&fs::read_to_string(metadata_path).unwrap()).unwrap();
        assert_eq!(metadata.version, "02.50.0");
        assert_eq!(metadata.sources.len(), 2);
        assert_eq!(metadata.sources[0].format, "tar.gz");
        assert!(metadata.sources[0]
            .sha256
            .as_deref()
            .unwrap()
            .ends_with("graphviz-2.50.0.tar.gz.sha256"));
        assert_eq!(metadata.windows.len(), 1);
        assert_eq!(metadata.windows[0].format, "EXE installer");
        assert!(metadata.windows[0].url.ends_with("/2.50.0/windows_10_cmake_Release_app.exe"));

        let requests = d.registrar().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tag_name, "2.50.0");
        assert_eq!(requests[0].assets.len(), 6);
        assert_eq!(requests[0].assets[0].name, "graphviz-2.50.0.tar.gz");
    }

    #[test]
    fn test_source_sidecar_records_relative_name() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        d.run(&release("2.50.0")).unwrap();

        let sidecar = fs::read_to_string(tmp.path().join("graphviz-2.50.0.tar.gz.sha256")).unwrap();
        assert!(sidecar.ends_with("  graphviz-2.50.0.tar.gz\n"));
        let sidecar = fs::read_to_string(tmp.path().join(format!("{WEB_EXE}.sha256"))).unwrap();
        assert!(sidecar.ends_with(&format!("  {WEB_EXE}\n")));
    }

    #[test]
    fn test_darwin_package_checksummed_but_not_on_web_page() {
        let darwin = "Packages/Darwin/graphviz-2.50.0.pkg";
        let tmp = tree("2.50.0", &[WEB_EXE, darwin]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        d.run(&release("2.50.0")).unwrap();

        assert!(tmp.path().join(format!("{darwin}.sha256")).is_file());
        let calls = d.uploader().transfer().calls();
        assert!(calls
            .iter()
            .any(|u| u.ends_with("/Darwin_graphviz-2.50.0.pkg.sha256")));
        assert_eq!(d.ledger().count(), 8);

        let metadata: ReleaseMetadata = serde_json::from_str(
            &fs::read_to_string(tmp.path().join("graphviz-2.50.0.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.windows.len(), 1);
    }

    #[test]
    fn test_linux_package_not_checksummed() {
        let deb = "Packages/ubuntu/graphviz.deb";
        let tmp = tree("2.50.0", &[WEB_EXE, deb]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        d.run(&release("2.50.0")).unwrap();

        assert!(!tmp.path().join(format!("{deb}.sha256")).exists());
        assert_eq!(d.ledger().count(), 7);
    }

    #[test]
    fn test_every_package_file_uploaded() {
        let deb = "Packages/ubuntu/x.deb";
        let tmp = tree("2.50.0", &[WEB_EXE, deb, "Packages/ubuntu/x.deb.sha256"]);
        std::os::unix::fs::symlink(
            tmp.path().join(deb),
            tmp.path().join("Packages/ubuntu/x-latest.deb"),
        )
        .unwrap();
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        d.run(&release("2.50.0")).unwrap();

        let calls = d.uploader().transfer().calls();
        for name in ["/ubuntu_x.deb", "/ubuntu_x.deb.sha256", "/ubuntu_x-latest.deb"] {
            assert!(calls.iter().any(|u| u.ends_with(name)), "{name} not uploaded");
        }
        // 6 for sources and installer, 3 from ubuntu/
        assert_eq!(d.ledger().count(), 9);
    }

    #[test]
    fn test_windows_bits_recorded() {
        let exe = "Packages/windows/10/cmake/Release/win32/graphviz-install.exe";
        let tmp = tree("2.50.0", &[exe]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        d.run(&release("2.50.0")).unwrap();

        let metadata: ReleaseMetadata = serde_json::from_str(
            &fs::read_to_string(tmp.path().join("graphviz-2.50.0.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.windows[0].bits, Some(32));
    }

    #[test]
    fn test_packages_permissions_normalized() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let exe = tmp.path().join(WEB_EXE);
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o777)).unwrap();

        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        d.run(&release("2.50.0")).unwrap();

        let mode = fs::metadata(&exe).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o740);
    }

    #[test]
    fn test_snapshot_is_dry_run_and_skips_release() {
        let version = "2.50.0~dev.20211212.0101";
        let tmp = tree(version, &[WEB_EXE]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());

        let outcome = d.run(&release(version)).unwrap();
        assert_eq!(outcome, DeployOutcome::Skipped { assets: 6 });
        assert_eq!(d.state(), PipelineState::Done);
        assert!(d.uploader().transfer().calls().is_empty());
        assert!(d.registrar().requests().is_empty());
        assert!(!tmp.path().join(format!("graphviz-{version}.json")).exists());
        assert!(d.ledger().assets()[0].url.contains("/graphviz-releases/0.0."));
    }

    #[test]
    fn test_rejected_upload_aborts_run() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        // the first checksum upload is rejected
        let transfer = FakeTransfer::created().fail_at(1, "{\"message\":\"400 Bad Request\"}");
        let mut d = deployer(tmp.path(), transfer, FakeRegistrar::default());

        let err = d.run(&release("2.50.0")).unwrap_err();
        assert_eq!(d.state(), PipelineState::Aborted);
        assert!(matches!(
            err.downcast_ref::<UploadError>(),
            Some(UploadError::Rejected { .. })
        ));

        // nothing after the failed upload was attempted
        assert_eq!(d.uploader().transfer().calls().len(), 2);
        assert_eq!(d.ledger().count(), 1);
        assert!(!tmp.path().join("graphviz-2.50.0.tar.xz.sha256").exists());
        assert!(d.registrar().requests().is_empty());
    }

    #[test]
    fn test_missing_source_archive_aborts_before_upload() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "graphviz-2.50.0.tar.gz");
        touch(tmp.path(), WEB_EXE);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());

        let err = d.run(&release("2.50.0")).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert_eq!(d.state(), PipelineState::Aborted);
        assert!(d.uploader().transfer().calls().is_empty());
    }

    #[test]
    fn test_too_many_assets_aborts_before_release() {
        // 2 archives + 2 sidecars + 47 linux packages = 51 assets
        let debs: Vec<String> = (0..47)
            .map(|i| format!("Packages/ubuntu/graphviz-{i:02}.deb"))
            .collect();
        let mut packages: Vec<&str> = debs.iter().map(String::as_str).collect();
        packages.push(WEB_EXE);
        let tmp = tree("2.50.0", &packages);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());

        let err = d.run(&release("2.50.0")).unwrap_err();
        assert!(d.ledger().count() > MAX_VIEWABLE_ASSETS);
        assert!(err.to_string().contains("unviewable"));
        assert!(d.registrar().requests().is_empty());
        assert!(!tmp.path().join("graphviz-2.50.0.json").exists());
    }

    #[test]
    fn test_no_windows_entries_is_invalid() {
        let tmp = tree("2.50.0", &["Packages/windows/10/msbuild/Release/app.zip"]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());

        let err = d.run(&release("2.50.0")).unwrap_err();
        assert!(err.to_string().contains("no Windows artifacts found"));
        assert!(d.registrar().requests().is_empty());
    }

    #[test]
    fn test_registrar_failure_aborts_without_metadata() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let mut d = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::failing(1));

        assert!(d.run(&release("2.50.0")).is_err());
        assert_eq!(d.state(), PipelineState::Aborted);
        assert!(!tmp.path().join("graphviz-2.50.0.json").exists());
    }

    #[test]
    fn test_rerun_targets_same_urls() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let mut first = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        first.run(&release("2.50.0")).unwrap();
        let mut second = deployer(tmp.path(), FakeTransfer::created(), FakeRegistrar::default());
        second.run(&release("2.50.0")).unwrap();

        assert_eq!(
            first.uploader().transfer().calls(),
            second.uploader().transfer().calls()
        );
    }

    #[test]
    fn test_failure_exit_code_for_invariant() {
        let err = anyhow::anyhow!("no Windows artifacts found");
        assert_eq!(failure_exit_code(&err), FAILURE_EXIT_CODE);
    }

    #[test]
    fn test_failure_exit_code_propagates_command_status() {
        let err = Cmd::new("sh")
            .args(["-c", "exit 5"])
            .run()
            .unwrap_err()
            .context("creating release 2.50.0");
        assert_eq!(failure_exit_code(&err), 5);
    }

    #[test]
    fn test_failure_exit_code_propagates_transfer_status() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let transfer = FakeTransfer::responding(Some(7), "curl: (7) Failed to connect");
        let mut d = deployer(tmp.path(), transfer, FakeRegistrar::default());

        let err = d.run(&release("2.50.0")).unwrap_err();
        assert_eq!(failure_exit_code(&err), 7);
    }

    #[test]
    fn test_failure_exit_code_for_rejected_upload() {
        let tmp = tree("2.50.0", &[WEB_EXE]);
        let transfer = FakeTransfer::responding(Some(0), "{\"message\":\"400 Bad Request\"}");
        let mut d = deployer(tmp.path(), transfer, FakeRegistrar::default());

        let err = d.run(&release("2.50.0")).unwrap_err();
        assert_eq!(failure_exit_code(&err), FAILURE_EXIT_CODE);
    }
}
