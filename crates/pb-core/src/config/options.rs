//! Build option validation

use super::hosts::Configuration;
use crate::error::OptionsError;
use crate::projects::Project;
use crate::types::SubprojectBranch;
use std::fmt;
use std::path::PathBuf;

/// Build options as given on the command line, before validation
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub debug: bool,
    pub nodebug: bool,
    pub target: Option<String>,
    pub branch: Option<String>,
    pub subprojects: Option<String>,
    pub abort_on_error: bool,
    pub no_cleanup: bool,
    pub force_clone: bool,
    pub command: Option<String>,
    pub configure: Option<String>,
    pub container: Option<PathBuf>,
    pub diagnose: bool,
}

/// Release or debug configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    #[default]
    Release,
    Debug,
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildType::Release => write!(f, "RELEASE"),
            BuildType::Debug => write!(f, "DEBUG"),
        }
    }
}

/// Validated, run-wide build options
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub build_type: BuildType,
    /// `Some("")` skips the make step
    pub target: Option<String>,
    pub branch: Option<String>,
    pub subprojects: Vec<SubprojectBranch>,
    pub abort_on_error: bool,
    /// Stash local changes again after a successful build
    pub cleanup: bool,
    pub force_clone: bool,
    /// Run this instead of a build
    pub command: Option<String>,
    /// Replaces the `[configure]` entry for every project
    pub configure_override: Option<String>,
    /// Tarball shipped after the script instead of using git
    pub container: Option<PathBuf>,
    /// Keep remote scripts after they run
    pub diagnose: bool,
    pub test_attributes: String,
    pub test_list: String,
}

impl BuildRequest {
    /// Validate the request against the resolved configuration
    pub fn resolve(self, config: &Configuration) -> Result<BuildOptions, OptionsError> {
        if self.debug && self.nodebug {
            return Err(OptionsError::ConflictingDebug);
        }

        if self.command.is_some() {
            let conflicts = [
                ("branch", self.branch.is_some()),
                ("subproject", self.subprojects.is_some()),
                ("clone", self.force_clone),
                ("target", self.target.is_some()),
                ("configure", self.configure.is_some()),
                ("container", self.container.is_some()),
            ];
            if let Some((name, _)) = conflicts.iter().find(|(_, set)| *set) {
                return Err(OptionsError::ConflictsWithCommand(*name));
            }
        }

        let subprojects = match &self.subprojects {
            Some(list) => SubprojectBranch::parse_list(list)?,
            None => Vec::new(),
        };

        if let Some(path) = &self.container {
            if !path.is_file() {
                return Err(OptionsError::ContainerNotFound(path.clone()));
            }
        }

        Ok(BuildOptions {
            build_type: if self.debug { BuildType::Debug } else { BuildType::Release },
            target: self.target.map(|t| t.trim().to_string()),
            branch: self.branch.filter(|b| !b.trim().is_empty()),
            subprojects,
            abort_on_error: self.abort_on_error,
            cleanup: !self.no_cleanup,
            force_clone: self.force_clone,
            command: self.command,
            configure_override: self.configure,
            container: self.container,
            diagnose: self.diagnose || config.settings.diagnose_errors,
            test_attributes: config.test_attributes.clone(),
            test_list: config.test_list.clone(),
        })
    }
}

impl BuildOptions {
    /// Reject subproject overrides that `project` does not declare
    pub fn check_subprojects(&self, project: &dyn Project) -> Result<(), OptionsError> {
        match self
            .subprojects
            .iter()
            .find(|sub| !project.has_subproject(&sub.directory))
        {
            Some(sub) => Err(OptionsError::UnknownSubproject {
                project: project.name().to_string(),
                directory: sub.directory.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Make targets for a project, or `None` when the make step is skipped
    pub fn make_targets<'a>(&'a self, project: &'a dyn Project) -> Option<&'a str> {
        match self.target.as_deref() {
            Some("") => None,
            Some(target) => Some(target),
            None => Some(project.default_targets().trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, Overrides};
    use crate::projects::ProjectKind;
    use std::path::Path;

    fn config() -> Configuration {
        let file: ConfigFile = toml::from_str(
            r#"
            settings = "DiagnoseErrors"

            [[hosts]]
            tag = "rhel7"
            address = "build-rhel7"
            path = "~/dev/om"
            project = "om"
            "#,
        )
        .unwrap();
        Configuration::from_file(Path::new("pbuild.toml"), file, &Overrides::default()).unwrap()
    }

    #[test]
    fn test_debug_and_nodebug_conflict() {
        let request = BuildRequest { debug: true, nodebug: true, ..Default::default() };
        assert_eq!(request.resolve(&config()).unwrap_err(), OptionsError::ConflictingDebug);
    }

    #[test]
    fn test_command_conflicts() {
        let request = BuildRequest {
            command: Some("uname -a".into()),
            target: Some("all".into()),
            ..Default::default()
        };
        assert_eq!(
            request.resolve(&config()).unwrap_err(),
            OptionsError::ConflictsWithCommand("target")
        );
    }

    #[test]
    fn test_defaults() {
        let options = BuildRequest::default().resolve(&config()).unwrap();
        assert_eq!(options.build_type, BuildType::Release);
        assert!(options.cleanup);
        assert!(options.diagnose, "DiagnoseErrors setting carries over");
        assert!(options.subprojects.is_empty());
    }

    #[test]
    fn test_subproject_checked_against_project() {
        let request = BuildRequest { subprojects: Some("pal:dev,docker:x".into()), ..Default::default() };
        let options = request.resolve(&config()).unwrap();
        let err = options.check_subprojects(ProjectKind::Om.template()).unwrap_err();
        assert_eq!(
            err,
            OptionsError::UnknownSubproject { project: "om".into(), directory: "docker".into() }
        );
        assert!(options.check_subprojects(ProjectKind::Docker.template()).is_ok());
    }

    #[test]
    fn test_make_targets() {
        let om = ProjectKind::Om.template();
        let mut options = BuildOptions::default();
        assert_eq!(options.make_targets(om), Some("all test"));
        options.target = Some("clean".into());
        assert_eq!(options.make_targets(om), Some("clean"));
        options.target = Some(String::new());
        assert_eq!(options.make_targets(om), None);
    }

    #[test]
    fn test_missing_container() {
        let request = BuildRequest {
            container: Some(PathBuf::from("/nonexistent/bundle.tar")),
            ..Default::default()
        };
        assert!(matches!(
            request.resolve(&config()),
            Err(OptionsError::ContainerNotFound(_))
        ));
    }
}
