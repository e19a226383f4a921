//! The concrete [`Builder`]/[`BinaryInstaller`] the CLI hands to the scheduler: shells out to
//! an external build tool and drives the binary backend's download/expand pipeline. The build
//! tool itself is out of scope (§1) — this is only the seam that invokes it.

use std::path::PathBuf;
use std::process::Command;
use utica::build::versionfile::{hash_bundle, PlatformArtifact};
use utica::build::{BinaryInstaller, BuildNode, BuildOptions, Builder};
use utica::config::Config;
use utica::dependency::DependencyId;
use utica::error::Error;
use utica::source::BinaryBackend;

pub struct ShellBuilder<'a> {
    pub config: &'a Config,
    pub command: String,
}

impl<'a> ShellBuilder<'a> {
    pub fn new(config: &'a Config, command: String) -> Self {
        ShellBuilder { config, command }
    }

    fn bundle_dir(&self, node: &BuildNode, platform: &str) -> PathBuf {
        self.config
            .build_dir()
            .join(platform)
            .join(format!("{}.framework", node.dep.name()))
    }
}

impl<'a> Builder for ShellBuilder<'a> {
    fn build(
        &self,
        node: &BuildNode,
        platform: &str,
        options: &BuildOptions,
    ) -> Result<PlatformArtifact, Error> {
        let work_dir = self.config.checkout_path(&node.dep.name());
        let output = Command::new(&self.command)
            .arg("--project-directory")
            .arg(&work_dir)
            .arg("--platform")
            .arg(platform)
            .arg("--configuration")
            .arg(&options.configuration)
            .output()
            .map_err(|e| Error::Subprocess {
                command: self.command.clone(),
                status: -1,
                output: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("shared scheme") {
                return Err(Error::NoSharedSchemes(node.dep.clone()));
            }
            return Err(Error::Subprocess {
                command: self.command.clone(),
                status: output.status.code().unwrap_or(-1),
                output: stderr.into_owned(),
            });
        }

        let bundle_dir = self.bundle_dir(node, platform);
        let hash = hash_bundle(&bundle_dir)?;
        Ok(PlatformArtifact {
            name: node.dep.name(),
            hash,
        })
    }
}

pub struct ShellBinaryInstaller<'a> {
    pub config: &'a Config,
    pub binary: &'a BinaryBackend,
}

impl<'a> ShellBinaryInstaller<'a> {
    pub fn new(config: &'a Config, binary: &'a BinaryBackend) -> Self {
        ShellBinaryInstaller { config, binary }
    }
}

impl<'a> BinaryInstaller for ShellBinaryInstaller<'a> {
    fn try_install(
        &self,
        node: &BuildNode,
        platform: &str,
        options: &BuildOptions,
    ) -> Result<Option<PlatformArtifact>, Error> {
        let DependencyId::Binary { url, .. } = &node.dep else {
            // Release-asset discovery for hosted (github/git) dependencies is not
            // implemented; they always fall through to a source build.
            return Ok(None);
        };

        let manifest = self.binary.fetch_manifest(url)?;
        let Some(urls) = manifest.get(&node.version) else {
            return Ok(None);
        };
        let selected = utica::source::binary::select_assets(urls, options.use_xcframeworks);
        let Some(asset_url) = selected.into_iter().next() else {
            return Ok(None);
        };

        let archive_path = self
            .binary
            .download_asset(&node.dep.name(), &node.version, &asset_url)?;
        let dest_root = self.config.checkout_path(&node.dep.name());
        let installed = self
            .binary
            .expand_zip_archive(&archive_path, &dest_root, &node.dep)?;
        let Some(bundle_dir) = installed.into_iter().find(|p| {
            p.to_string_lossy().contains(platform) || p.to_string_lossy().contains(&node.dep.name())
        }) else {
            return Ok(None);
        };

        let hash = hash_bundle(&bundle_dir)?;
        Ok(Some(PlatformArtifact {
            name: node.dep.name(),
            hash,
        }))
    }
}
