//! Catalog of buildable projects
//!
//! Each project kind maps to a static [`ProjectTemplate`]. The script
//! assembler only sees the [`Project`] trait, so tests can supply their own
//! templates.

use crate::error::ConfigError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Build characteristics of a project
pub trait Project: Send + Sync {
    /// Name used to look up `[configure]` overrides
    fn name(&self) -> &str;

    /// Directory (relative to the repository root) the build runs from
    fn build_directory(&self) -> &str;

    /// Git URL used when the repository has to be cloned
    fn clone_source(&self) -> &str;

    fn uses_configure_script(&self) -> bool;

    /// Qualifiers always passed to `./configure`
    fn configure_qualifiers(&self) -> &str;

    /// Whether `dir` is a submodule directory this project declares
    fn has_subproject(&self, dir: &str) -> bool;

    /// Whether `make depend` runs before the build
    fn make_depend(&self) -> bool;

    /// Targets handed to `make` when none are given on the command line
    fn default_targets(&self) -> &str;

    fn post_build_steps(&self) -> &[&str];
}

/// Static description of a project in the catalog
#[derive(Debug, PartialEq, Eq)]
pub struct ProjectTemplate {
    pub name: &'static str,
    pub build_directory: &'static str,
    pub clone_source: &'static str,
    pub uses_configure: bool,
    pub configure_qualifiers: &'static str,
    pub subprojects: &'static [&'static str],
    pub make_depend: bool,
    pub targets: &'static str,
    pub post_build: &'static [&'static str],
}

impl Project for ProjectTemplate {
    fn name(&self) -> &str {
        self.name
    }

    fn build_directory(&self) -> &str {
        self.build_directory
    }

    fn clone_source(&self) -> &str {
        self.clone_source
    }

    fn uses_configure_script(&self) -> bool {
        self.uses_configure
    }

    fn configure_qualifiers(&self) -> &str {
        self.configure_qualifiers
    }

    fn has_subproject(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        self.subprojects.iter().any(|sub| *sub == dir)
    }

    fn make_depend(&self) -> bool {
        self.make_depend
    }

    fn default_targets(&self) -> &str {
        self.targets
    }

    fn post_build_steps(&self) -> &[&str] {
        self.post_build
    }
}

const APACHE: ProjectTemplate = ProjectTemplate {
    name: "apache",
    build_directory: "apache/build",
    clone_source: "git@github.com:Microsoft/Build-Apache-Provider.git",
    uses_configure: true,
    configure_qualifiers: "",
    subprojects: &["apache", "omi", "pal"],
    make_depend: false,
    targets: "all test",
    post_build: &[],
};

const CM: ProjectTemplate = ProjectTemplate {
    name: "cm",
    build_directory: "configmgr/Unix",
    clone_source: "git@github.com:Microsoft/Build-SCXcm.git",
    uses_configure: true,
    configure_qualifiers: "",
    subprojects: &["configmgr", "omi", "pal"],
    make_depend: true,
    targets: "all release test",
    post_build: &[],
};

const DOCKER: ProjectTemplate = ProjectTemplate {
    name: "docker",
    build_directory: "docker/build",
    clone_source: "git@github.com:Microsoft/Build-Docker-Provider.git",
    uses_configure: true,
    configure_qualifiers: "--enable-ulinux",
    subprojects: &["docker", "omi", "pal"],
    make_depend: false,
    targets: "all test",
    post_build: &[],
};

const DSC: ProjectTemplate = ProjectTemplate {
    name: "dsc",
    build_directory: "dsc",
    clone_source: "git@github.com:Microsoft/Build-PowerShell-DSC-for-Linux.git",
    uses_configure: true,
    configure_qualifiers: "",
    subprojects: &["dsc", "omi", "pal"],
    make_depend: false,
    targets: "all",
    post_build: &[],
};

const MYSQL: ProjectTemplate = ProjectTemplate {
    name: "mysql",
    build_directory: "mysql/build",
    clone_source: "git@github.com:Microsoft/Build-MySQL-Provider.git",
    uses_configure: true,
    configure_qualifiers: "",
    subprojects: &["mysql", "omi", "pal"],
    make_depend: false,
    targets: "all test",
    post_build: &[],
};

const OM: ProjectTemplate = ProjectTemplate {
    name: "om",
    build_directory: "opsmgr/build",
    clone_source: "git@github.com:Microsoft/Build-SCXcore.git",
    uses_configure: true,
    configure_qualifiers: "--enable-system-build",
    subprojects: &["omi", "opsmgr", "pal"],
    make_depend: false,
    targets: "all test",
    post_build: &[],
};

// `make clean` only gives make something to do; ./regress is all-inclusive.
const OMI: ProjectTemplate = ProjectTemplate {
    name: "omi",
    build_directory: "omi/Unix",
    clone_source: "git@github.com:Microsoft/Build-omi.git",
    uses_configure: true,
    configure_qualifiers: "--dev",
    subprojects: &["omi", "pal"],
    make_depend: false,
    targets: "clean",
    post_build: &["./regress"],
};

// Shares the omi name so `[configure] omi = ...` applies to kit builds too.
const OMIKITS: ProjectTemplate = ProjectTemplate {
    name: "omi",
    build_directory: "omi/Unix",
    clone_source: "git@github.com:Microsoft/Build-omi.git",
    uses_configure: true,
    configure_qualifiers: "--enable-system-build --enable-native-kits",
    subprojects: &["omi", "pal"],
    make_depend: false,
    targets: "",
    post_build: &[
        "echo -n The OMI native kit is here: ; echo -n `hostname`; echo -n :; cd ./../Packages; pwd; echo; ls -R",
    ],
};

const OMS: ProjectTemplate = ProjectTemplate {
    name: "oms",
    build_directory: "omsagent/build",
    clone_source: "git@github.com:Microsoft/Build-OMS-Agent-for-Linux.git",
    uses_configure: true,
    configure_qualifiers: "--enable-ulinux",
    subprojects: &["dsc", "omi", "omsagent", "opsmgr", "pal"],
    make_depend: false,
    targets: "all test",
    post_build: &[],
};

const PAL: ProjectTemplate = ProjectTemplate {
    name: "pal",
    build_directory: "build",
    clone_source: "git@github.com:Microsoft/pal.git",
    uses_configure: true,
    configure_qualifiers: "",
    subprojects: &[],
    make_depend: false,
    targets: "all test",
    post_build: &[],
};

const PSRP: ProjectTemplate = ProjectTemplate {
    name: "psrp",
    build_directory: ".",
    clone_source: "git@github.com:PowerShell/psl-omi-provider.git",
    uses_configure: false,
    configure_qualifiers: "",
    subprojects: &["omi", "pal"],
    make_depend: false,
    targets: "release-ulinux",
    post_build: &[],
};

/// Project kinds a host can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum ProjectKind {
    Apache,
    Cm,
    Docker,
    Dsc,
    Mysql,
    Om,
    Omi,
    Omikits,
    Oms,
    Pal,
    Psrp,
}

impl ProjectKind {
    /// Every kind in the catalog
    pub const ALL: [ProjectKind; 11] = [
        ProjectKind::Apache,
        ProjectKind::Cm,
        ProjectKind::Docker,
        ProjectKind::Dsc,
        ProjectKind::Mysql,
        ProjectKind::Om,
        ProjectKind::Omi,
        ProjectKind::Omikits,
        ProjectKind::Oms,
        ProjectKind::Pal,
        ProjectKind::Psrp,
    ];

    /// The static template describing this project
    pub fn template(self) -> &'static ProjectTemplate {
        match self {
            ProjectKind::Apache => &APACHE,
            ProjectKind::Cm => &CM,
            ProjectKind::Docker => &DOCKER,
            ProjectKind::Dsc => &DSC,
            ProjectKind::Mysql => &MYSQL,
            ProjectKind::Om => &OM,
            ProjectKind::Omi => &OMI,
            ProjectKind::Omikits => &OMIKITS,
            ProjectKind::Oms => &OMS,
            ProjectKind::Pal => &PAL,
            ProjectKind::Psrp => &PSRP,
        }
    }

    /// Configuration keyword for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectKind::Apache => "apache",
            ProjectKind::Cm => "cm",
            ProjectKind::Docker => "docker",
            ProjectKind::Dsc => "dsc",
            ProjectKind::Mysql => "mysql",
            ProjectKind::Om => "om",
            ProjectKind::Omi => "omi",
            ProjectKind::Omikits => "omikits",
            ProjectKind::Oms => "oms",
            ProjectKind::Pal => "pal",
            ProjectKind::Psrp => "psrp",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ProjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownProject(s.to_string()))
    }
}

impl TryFrom<String> for ProjectKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for ProjectKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("OMI".parse::<ProjectKind>().unwrap(), ProjectKind::Omi);
        assert_eq!("OmiKits".parse::<ProjectKind>().unwrap(), ProjectKind::Omikits);
        assert!(matches!(
            "scx".parse::<ProjectKind>(),
            Err(ConfigError::UnknownProject(_))
        ));
    }

    #[test]
    fn test_every_kind_has_template() {
        for kind in ProjectKind::ALL {
            let template = kind.template();
            assert!(!template.build_directory.is_empty(), "{kind}");
            assert!(template.clone_source.starts_with("git@github.com:"), "{kind}");
        }
    }

    #[test]
    fn test_omikits_shares_omi_name() {
        assert_eq!(ProjectKind::Omikits.template().name(), "omi");
        assert_eq!(ProjectKind::Omikits.as_str(), "omikits");
    }

    #[test]
    fn test_subproject_validation() {
        let om = ProjectKind::Om.template();
        assert!(om.has_subproject("opsmgr"));
        assert!(om.has_subproject("pal/"));
        assert!(!om.has_subproject("docker"));
        assert!(!ProjectKind::Pal.template().has_subproject("omi"));
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&ProjectKind::Mysql).unwrap();
        assert_eq!(json, r#""mysql""#);
        let parsed: ProjectKind = serde_json::from_str(r#""Psrp""#).unwrap();
        assert_eq!(parsed, ProjectKind::Psrp);
        assert!(serde_json::from_str::<ProjectKind>(r#""nope""#).is_err());
    }
}
