//! `git lb-clone-pkg`: clone a data package and make it usable in place.
//!
//! Data packages are looked up by version, so besides the plain clone the
//! checkout gets `v999r999` and `v<major>r999` links pointing at itself and
//! the legacy `<Name>Environment.xml` link to the package's `.xenv` file.

use std::path::{Path, PathBuf};

use regex_lite::Regex;
use tracing::{debug, info, instrument, warn};

use crate::errors::{ClonePkgError, GitError};
use crate::git::client::run_git;
use crate::git::protocol::{package_url, Protocol, PROTOCOL_CONFIG_KEY};
use crate::remote_use::protocol_or;

/// Alias always added, whatever the package version.
pub const HEAD_VERSION_ALIAS: &str = "v999r999";

const VERSION_PATTERN: &str = r"^v(\d+)r(\d+)(?:p(\d+))?$";

#[derive(Debug, Clone)]
pub struct ClonePkgRequest {
    /// Package name, possibly with a hat (`Gen/DecFiles`).
    pub name: String,
    /// Repository to clone; derived from `name` and `protocol` when unset.
    pub url: Option<String>,
    pub protocol: Protocol,
    /// Name of the remote tracking upstream (git's default is `origin`).
    pub origin: Option<String>,
    /// Branch to check out instead of the remote HEAD.
    pub branch: Option<String>,
    /// Let `git clone` report progress.
    pub verbose: bool,
}

/// What was set up by [`lb_clone_pkg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonedPackage {
    pub path: PathBuf,
    /// Version the aliases were derived from, if any was found.
    pub version: Option<String>,
    pub aliases: Vec<String>,
}

/// Protocol from `lb-use.protocol` in the git configuration visible from
/// `dir` (repository, then global), else `fallback`.
pub fn configured_protocol(dir: &Path, fallback: Protocol) -> Result<Protocol, GitError> {
    let config = match git2::Repository::discover(dir) {
        Ok(repo) => repo.config()?,
        Err(_) => git2::Config::open_default()?,
    };
    let value = match config.get_string(PROTOCOL_CONFIG_KEY) {
        Ok(value) => Some(value),
        Err(e) if e.code() == git2::ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    Ok(protocol_or(value, fallback))
}

/// Name of the legacy environment file of `package`.
pub fn environment_xml_name(package: &str) -> String {
    format!("{}Environment.xml", package.replace('/', "_"))
}

/// Target of the legacy environment link.
pub fn xenv_name(package: &str) -> String {
    format!("{}.xenv", package.replace('/', "_"))
}

/// Sort key of a `vXrY[pZ]` version, `None` for anything else.
pub fn version_key(version: &str) -> Option<(u32, u32, u32)> {
    let re = Regex::new(VERSION_PATTERN).ok()?;
    let caps = re.captures(version)?;
    let number = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok());
    Some((number(1)?, number(2)?, number(3)?))
}

/// Highest valid version among `tags`.
pub fn latest_version<'a>(tags: impl IntoIterator<Item = &'a str>) -> Option<String> {
    tags.into_iter()
        .filter_map(|tag| version_key(tag).map(|key| (key, tag)))
        .max_by_key(|(key, _)| *key)
        .map(|(_, tag)| tag.to_string())
}

/// Links to create for a package at `version`: `v999r999` plus the
/// `r999` alias of its major version.
pub fn version_aliases(version: Option<&str>) -> Vec<String> {
    let mut aliases = vec![HEAD_VERSION_ALIAS.to_string()];
    if let Some(v) = version {
        if let Some(pos) = v.rfind('r') {
            let alias = format!("{}r999", &v[..pos]);
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
    }
    aliases
}

/// Version declared in a CMT `requirements` file.
pub fn requirements_version(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("version"))
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

/// Clone `request.name` into `workdir` and add the version links.
#[instrument(skip(workdir))]
pub async fn lb_clone_pkg(
    workdir: &Path,
    request: &ClonePkgRequest,
) -> Result<ClonedPackage, ClonePkgError> {
    let url = request
        .url
        .clone()
        .unwrap_or_else(|| package_url(&request.name, request.protocol));

    let mut args = vec!["clone".to_string()];
    if request.verbose {
        args.push("-v".into());
    } else {
        args.push("--quiet".into());
    }
    if let Some(origin) = &request.origin {
        args.push(format!("--origin={}", origin));
    }
    if let Some(branch) = &request.branch {
        args.push(format!("--branch={}", branch));
    }
    args.push(url.clone());
    args.push(request.name.clone());
    info!("cloning {} into {}", url, request.name);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_git(workdir, &args, None).await?;

    let path = workdir.join(&request.name);
    debug!("initializing data package");

    let xml_env = path.join(environment_xml_name(&request.name));
    if !xml_env.exists() {
        debug!(" - adding {}", environment_xml_name(&request.name));
        make_link(Path::new(&xenv_name(&request.name)), &xml_env)?;
    }

    let requirements = path.join("cmt").join("requirements");
    let version = if requirements.exists() {
        requirements_version(&std::fs::read_to_string(&requirements)?)
    } else {
        latest_tag(&path).await?
    };
    let aliases = version_aliases(version.as_deref());

    debug!(" - creating links {:?} in {}", aliases, request.name);
    for alias in &aliases {
        let link = path.join(alias);
        if link.symlink_metadata().is_ok() {
            warn!("{} already exists in {}, not linking", alias, request.name);
            continue;
        }
        make_link(Path::new("."), &link)?;
    }

    Ok(ClonedPackage {
        path,
        version,
        aliases,
    })
}

/// Most recent tag reachable from HEAD, else the highest version tag.
async fn latest_tag(path: &Path) -> Result<Option<String>, GitError> {
    match run_git(path, &["describe", "--match", "*", "--abbrev=0", "--tags"], None).await {
        Ok(tag) => Ok(Some(tag.trim().to_string()).filter(|t| !t.is_empty())),
        Err(GitError::CommandFailed { .. }) => {
            debug!("no tag in current branch of {}", path.display());
            let tags = run_git(path, &["tag"], None).await?;
            Ok(latest_version(tags.split_whitespace()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    warn!(
        "symbolic links not supported, skipping {} -> {}",
        link.display(),
        target.display()
    );
    Ok(())
}
