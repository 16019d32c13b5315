//! GitLab remote URL derivation.
//!
//! Projects live in a fixed GitLab group layout; the URL of a project's
//! repository only depends on the access protocol the developer uses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Git config key holding the developer's preferred protocol.
pub const PROTOCOL_CONFIG_KEY: &str = "lb-use.protocol";

/// How to reach the GitLab server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// SSH on the dedicated port.
    Ssh,
    /// HTTPS with Kerberos authentication.
    #[default]
    Krb5,
    /// Plain HTTPS.
    Https,
}

impl Protocol {
    /// URL prefix, ending with a slash, for this protocol.
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Ssh => "ssh://git@gitlab.cern.ch:7999/",
            Self::Krb5 => "https://:@gitlab.cern.ch:8443/",
            Self::Https => "https://gitlab.cern.ch/",
        }
    }

    pub fn all() -> [Protocol; 3] {
        [Self::Ssh, Self::Krb5, Self::Https]
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::Krb5 => write!(f, "krb5"),
            Self::Https => write!(f, "https"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Self::Ssh),
            "krb5" => Ok(Self::Krb5),
            "https" => Ok(Self::Https),
            other => Err(ConfigError::InvalidValue {
                field: PROTOCOL_CONFIG_KEY.into(),
                detail: format!("unknown protocol '{}' (use ssh, krb5 or https)", other),
            }),
        }
    }
}

/// URL of the repository `name` in GitLab group `group`.
pub fn gitlab_url(group: &str, name: &str, protocol: Protocol) -> String {
    format!("{}{}/{}.git", protocol.base_url(), group, name)
}

/// GitLab group hosting a software project.
pub fn project_group(project: &str) -> &'static str {
    if project.eq_ignore_ascii_case("gaudi") {
        "gaudi"
    } else {
        "lhcb"
    }
}

/// URL of a software project's repository.
pub fn project_url(project: &str, protocol: Protocol) -> String {
    gitlab_url(project_group(project), project, protocol)
}

/// URL of a data package's repository.
pub fn package_url(name: &str, protocol: Protocol) -> String {
    gitlab_url("lhcb-datapkg", name, protocol)
}

/// Full GitLab name (`group/Name`) guessed from a project name.
pub fn guess_project_fullname(project: &str) -> String {
    format!("{}/{}", project_group(project), project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_url_per_protocol() {
        assert_eq!(
            project_url("LHCb", Protocol::Ssh),
            "ssh://git@gitlab.cern.ch:7999/lhcb/LHCb.git"
        );
        assert_eq!(
            project_url("Gaudi", Protocol::Krb5),
            "https://:@gitlab.cern.ch:8443/gaudi/Gaudi.git"
        );
        assert_eq!(
            project_url("Lbcom", Protocol::Https),
            "https://gitlab.cern.ch/lhcb/Lbcom.git"
        );
    }

    #[test]
    fn test_package_url() {
        assert_eq!(
            package_url("Gen/DecFiles", Protocol::Https),
            "https://gitlab.cern.ch/lhcb-datapkg/Gen/DecFiles.git"
        );
    }

    #[test]
    fn test_guess_project_fullname() {
        assert_eq!(guess_project_fullname("Gaudi"), "gaudi/Gaudi");
        assert_eq!(guess_project_fullname("Rec"), "lhcb/Rec");
    }

    #[test]
    fn test_parse_protocol() {
        assert_eq!("SSH".parse::<Protocol>().unwrap(), Protocol::Ssh);
        assert_eq!(" https ".parse::<Protocol>().unwrap(), Protocol::Https);
        assert!("ftp".parse::<Protocol>().is_err());
        for p in Protocol::all() {
            assert_eq!(p.to_string().parse::<Protocol>().unwrap(), p);
        }
    }
}
